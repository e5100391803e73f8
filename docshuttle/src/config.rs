use std::path::{Path, PathBuf};

use anyhow::Context;

const DEFAULT_EXPORT_DIR: &str = "Documents/docshuttle-exports";
const APP_DIR_NAME: &str = "docshuttle";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub state_db: PathBuf,
    pub export_dir: PathBuf,
    pub report_dir: PathBuf,
    pub thumbnails: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let data_root = dirs::data_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join(APP_DIR_NAME);
        let path_var = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| expand_with_home(&value, &home))
        };

        Ok(Self {
            base_url: lookup("DOCSHUTTLE_BASE_URL").filter(|value| !value.trim().is_empty()),
            token: lookup("DOCSHUTTLE_TOKEN").filter(|value| !value.is_empty()),
            state_db: path_var("DOCSHUTTLE_STATE_DB")
                .unwrap_or_else(|| data_root.join("state.db")),
            export_dir: path_var("DOCSHUTTLE_EXPORT_DIR")
                .unwrap_or_else(|| home.join(DEFAULT_EXPORT_DIR)),
            report_dir: path_var("DOCSHUTTLE_REPORT_DIR")
                .unwrap_or_else(|| data_root.join("reports")),
            thumbnails: read_bool(lookup("DOCSHUTTLE_THUMBNAILS"), true),
        })
    }

    pub fn require_base_url(&self) -> anyhow::Result<&str> {
        self.base_url
            .as_deref()
            .context("DOCSHUTTLE_BASE_URL is not set")
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    #[test]
    fn defaults_live_under_home_and_data_dir() {
        let config = config_with(&[]);
        let home = dirs::home_dir().unwrap();

        assert_eq!(config.base_url, None);
        assert_eq!(config.export_dir, home.join("Documents/docshuttle-exports"));
        assert!(config.state_db.ends_with("docshuttle/state.db"));
        assert!(config.report_dir.ends_with("docshuttle/reports"));
        assert!(config.thumbnails);
    }

    #[test]
    fn tilde_paths_expand_to_home() {
        let config = config_with(&[
            ("DOCSHUTTLE_EXPORT_DIR", "~/exports"),
            ("DOCSHUTTLE_STATE_DB", "/var/lib/ds/state.db"),
        ]);
        let home = dirs::home_dir().unwrap();

        assert_eq!(config.export_dir, home.join("exports"));
        assert_eq!(config.state_db, PathBuf::from("/var/lib/ds/state.db"));
    }

    #[test]
    fn thumbnails_can_be_switched_off() {
        assert!(!config_with(&[("DOCSHUTTLE_THUMBNAILS", "off")]).thumbnails);
        assert!(config_with(&[("DOCSHUTTLE_THUMBNAILS", "Yes")]).thumbnails);
    }

    #[test]
    fn blank_base_url_is_missing() {
        let config = config_with(&[("DOCSHUTTLE_BASE_URL", "  ")]);
        assert!(config.require_base_url().is_err());

        let config = config_with(&[("DOCSHUTTLE_BASE_URL", "https://dms.example")]);
        assert_eq!(config.require_base_url().unwrap(), "https://dms.example");
    }
}
