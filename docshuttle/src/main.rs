use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use docshuttle::config::AppConfig;
use docshuttle::logging;
use docshuttle::report::open_report;
use docshuttle::store::StateStore;
use docshuttle::token::{AccessTokenSource, StaticToken};
use docshuttle::transfer::metadata::MetadataIndex;
use docshuttle::transfer::selection::collect_import_items;
use docshuttle::transfer::thumbnail::ImageThumbnailer;
use docshuttle::transfer::{
    Direction, ExportEngine, FolderDescriptor, ImportEngine, RunSummary, TransferSession,
};
use docshuttle_core::DmsClient;
use tokio_util::sync::CancellationToken;

const USAGE: &str = "\
Usage: docshuttle <command> [--open-report]

Commands:
  import <path>... --to <folder-id> [--to-name <name>] [--metadata <file.json>]
  export --from <folder-id> [--from-name <name>] [--dest <dir>] [--with-metadata]
  resume import|export
  retry import|export
  status
  reset

  --open-report   Open the error report in the default viewer when one is written";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Import {
        paths: Vec<PathBuf>,
        to: FolderDescriptor,
        metadata: Option<PathBuf>,
    },
    Export {
        from: FolderDescriptor,
        dest: Option<PathBuf>,
        with_metadata: bool,
    },
    Resume(Direction),
    Retry(Direction),
    Status,
    Reset,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cli {
    command: Command,
    open_report: bool,
}

fn parse_cli<I>(args: I) -> anyhow::Result<Cli>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    let mut open_report = false;
    let mut positional = Vec::new();
    let mut to = None;
    let mut to_name = None;
    let mut from = None;
    let mut from_name = None;
    let mut dest = None;
    let mut metadata = None;
    let mut with_metadata = false;
    let mut help = false;

    while let Some(arg) = args.next() {
        let mut value_for = |flag: &str| {
            args.next()
                .with_context(|| format!("{flag} expects a value"))
        };
        match arg.as_str() {
            "--help" | "-h" => help = true,
            "--open-report" => open_report = true,
            "--with-metadata" => with_metadata = true,
            "--to" => to = Some(value_for("--to")?),
            "--to-name" => to_name = Some(value_for("--to-name")?),
            "--from" => from = Some(value_for("--from")?),
            "--from-name" => from_name = Some(value_for("--from-name")?),
            "--dest" => dest = Some(PathBuf::from(value_for("--dest")?)),
            "--metadata" => metadata = Some(PathBuf::from(value_for("--metadata")?)),
            other if other.starts_with("--") => anyhow::bail!("unknown argument: {other}"),
            other => positional.push(other.to_string()),
        }
    }

    if help {
        return Ok(Cli {
            command: Command::Help,
            open_report,
        });
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None => Command::Help,
        Some("import") => {
            let paths: Vec<PathBuf> = positional.by_ref().map(PathBuf::from).collect();
            anyhow::ensure!(!paths.is_empty(), "import needs at least one path");
            let id = to.context("import needs --to <folder-id>")?;
            let name = to_name.unwrap_or_else(|| id.clone());
            Command::Import {
                paths,
                to: FolderDescriptor::new(id, name),
                metadata,
            }
        }
        Some("export") => {
            let id = from.context("export needs --from <folder-id>")?;
            let name = from_name.unwrap_or_else(|| id.clone());
            Command::Export {
                from: FolderDescriptor::new(id, name),
                dest,
                with_metadata,
            }
        }
        Some("resume") => Command::Resume(parse_direction(positional.next())?),
        Some("retry") => Command::Retry(parse_direction(positional.next())?),
        Some("status") => Command::Status,
        Some("reset") => Command::Reset,
        Some(other) => anyhow::bail!("unknown command: {other}"),
    };
    if let Some(extra) = positional.next() {
        anyhow::bail!("unexpected argument: {extra}");
    }

    Ok(Cli {
        command,
        open_report,
    })
}

fn parse_direction(value: Option<String>) -> anyhow::Result<Direction> {
    match value.as_deref() {
        Some("import") => Ok(Direction::Import),
        Some("export") => Ok(Direction::Export),
        Some(other) => anyhow::bail!("expected import or export, got {other}"),
        None => anyhow::bail!("expected import or export"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = parse_cli(std::env::args())?;
    if cli.command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    logging::init()?;
    let config = AppConfig::from_env()?;
    let store = StateStore::open(&config.state_db)
        .await
        .with_context(|| format!("failed to open state database {}", config.state_db.display()))?;
    let mut session = TransferSession::load(store)
        .await
        .context("failed to load transfer state")?;

    let retry = matches!(cli.command, Command::Retry(_));
    let summary = match cli.command {
        Command::Help => return Ok(()),
        Command::Status => {
            print_status(&session);
            return Ok(());
        }
        Command::Reset => {
            session.reset().await?;
            println!("Transfer state cleared.");
            return Ok(());
        }
        Command::Import {
            paths,
            to,
            metadata,
        } => {
            let items = collect_import_items(&paths)?;
            let mut engine = import_engine(&config, metadata.as_deref()).await?;
            let _watch = watch_progress(&session, engine.cancellation_token());
            engine.start(&mut session, items, to).await?
        }
        Command::Export {
            from,
            dest,
            with_metadata,
        } => {
            let mut engine = export_engine(&config)?;
            let _watch = watch_progress(&session, engine.cancellation_token());
            let dest = dest.unwrap_or_else(|| config.export_dir.clone());
            engine.start(&mut session, from, dest, with_metadata).await?
        }
        Command::Resume(Direction::Import) | Command::Retry(Direction::Import) => {
            let mut engine = import_engine(&config, None).await?;
            let _watch = watch_progress(&session, engine.cancellation_token());
            if retry {
                engine.retry_failed(&mut session).await?
            } else {
                engine.resume(&mut session).await?
            }
        }
        Command::Resume(Direction::Export) | Command::Retry(Direction::Export) => {
            let mut engine = export_engine(&config)?;
            let _watch = watch_progress(&session, engine.cancellation_token());
            if retry {
                engine.retry_failed(&mut session).await?
            } else {
                engine.resume(&mut session).await?
            }
        }
    };

    finish(&summary, cli.open_report);
    Ok(())
}

fn client_and_token(config: &AppConfig) -> anyhow::Result<(DmsClient, Arc<dyn AccessTokenSource>)> {
    let client = DmsClient::new(config.require_base_url()?)?;
    let token = config
        .token
        .clone()
        .context("DOCSHUTTLE_TOKEN is not set")?;
    Ok((client, Arc::new(StaticToken::new(token))))
}

async fn import_engine(
    config: &AppConfig,
    metadata: Option<&std::path::Path>,
) -> anyhow::Result<ImportEngine> {
    let (client, tokens) = client_and_token(config)?;
    let mut engine = ImportEngine::new(client, tokens).with_report_dir(config.report_dir.clone());
    if let Some(path) = metadata {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read metadata file {}", path.display()))?;
        let index = MetadataIndex::from_json(&raw)
            .with_context(|| format!("invalid metadata file {}", path.display()))?;
        tracing::info!(entries = index.len(), "metadata loaded");
        engine = engine.with_metadata(index);
    }
    if config.thumbnails {
        engine = engine.with_thumbnails(Arc::new(ImageThumbnailer));
    }
    Ok(engine)
}

fn export_engine(config: &AppConfig) -> anyhow::Result<ExportEngine> {
    let (client, tokens) = client_and_token(config)?;
    Ok(ExportEngine::new(client, tokens).with_report_dir(config.report_dir.clone()))
}

/// Prints progress as the session changes and cancels the run on Ctrl-C.
/// Both tasks end when the returned guard is dropped.
fn watch_progress(session: &TransferSession, cancel: CancellationToken) -> tokio_util::sync::DropGuard {
    let stop = CancellationToken::new();
    let mut progress = session.subscribe();
    let stop_progress = stop.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop_progress.cancelled() => break,
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *progress.borrow();
                    for (label, queue) in [("import", snapshot.import), ("export", snapshot.export)] {
                        if queue.total > 0 {
                            eprintln!(
                                "[docshuttle] {label}: {}/{} ({} failed)",
                                queue.processed, queue.total, queue.failed
                            );
                        }
                    }
                }
            }
        }
    });
    let stop_signal = stop.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = stop_signal.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    eprintln!("[docshuttle] stopping after the current document");
                    cancel.cancel();
                }
            }
        }
    });
    stop.drop_guard()
}

fn print_status(session: &TransferSession) {
    let state = session.state();
    let resumable = |yes: bool| if yes { ", resumable" } else { "" };
    let import = state.import.progress();
    let export = state.export.progress();
    println!(
        "import: {} pending, {} failed{}{}",
        state.import.pending_len(),
        import.failed,
        resumable(session.has_resumable_import()),
        state
            .import_destination
            .as_ref()
            .map(|folder| format!(" (into {})", folder.name))
            .unwrap_or_default()
    );
    println!(
        "export: {} pending, {} failed{}{}",
        state.export.pending_len(),
        export.failed,
        resumable(session.has_resumable_export()),
        state
            .export_source
            .as_ref()
            .map(|folder| format!(" (from {})", folder.name))
            .unwrap_or_default()
    );
}

fn finish(summary: &RunSummary, open: bool) {
    println!("{}", summary.message());
    if !open {
        return;
    }
    if let Some(report) = summary.report.as_deref() {
        if let Err(err) = open_report(report) {
            eprintln!("[docshuttle] warning: {err}");
        }
    }
}
