use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_ENV: &str = "DOCSHUTTLE_LOG";
const DEFAULT_FILTER: &str = "info";

/// Installs a stderr fmt subscriber filtered by `DOCSHUTTLE_LOG`.
///
/// An unparsable filter falls back to `info`. Calling this twice is an error.
pub fn init() -> anyhow::Result<()> {
    let filter = build_filter(std::env::var(LOG_ENV).ok().as_deref());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}

fn build_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_broken_filters_fall_back_to_info() {
        assert_eq!(build_filter(None).to_string(), "info");
        assert_eq!(build_filter(Some("")).to_string(), "info");
        assert_eq!(build_filter(Some("docshuttle=loudest")).to_string(), "info");
    }

    #[test]
    fn explicit_filter_is_used() {
        assert_eq!(
            build_filter(Some("docshuttle=debug")).to_string(),
            "docshuttle=debug"
        );
    }
}
