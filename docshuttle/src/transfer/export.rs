use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docshuttle_core::DmsClient;
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::items::{ExportItem, FolderDescriptor};
use super::outcome::{
    Direction, EngineError, REASON_MD5_MISMATCH, RunEnd, RunSummary, complete_run,
};
use super::paths::{local_dir_for, numbered_file_name, sanitize_file_stem};
use super::session::TransferSession;
use crate::hasher::md5_hex;
use crate::token::AccessTokenSource;

pub const METADATA_FILE_NAME: &str = "metadata.csv";
const METADATA_HEADER: &str = "file,title,note,created\n";

enum Stage {
    ComputeDestDir,
    ComputeDestFilename { dir: PathBuf },
    Download { dir: PathBuf, stem: String },
    VerifyDigest { dir: PathBuf, stem: String, bytes: Vec<u8> },
    Write { dir: PathBuf, stem: String, bytes: Vec<u8> },
}

/// Downloads every document under a remote folder into a fresh local
/// directory, verifying each against its server-side md5.
pub struct ExportEngine {
    client: DmsClient,
    tokens: Arc<dyn AccessTokenSource>,
    report_dir: Option<PathBuf>,
    cancel: CancellationToken,
    /// Last numeric suffix handed out per `<dir>/<stem>.<ext>`, for this run.
    name_counters: HashMap<PathBuf, u32>,
}

impl ExportEngine {
    pub fn new(client: DmsClient, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            client,
            tokens,
            report_dir: None,
            cancel: CancellationToken::new(),
            name_counters: HashMap::new(),
        }
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Lists `source` and replaces any queued export with its documents.
    ///
    /// A failed listing aborts the run with nothing queued and the previous
    /// export state left untouched.
    pub async fn start(
        &mut self,
        session: &mut TransferSession,
        source: FolderDescriptor,
        destination: PathBuf,
        with_metadata: bool,
    ) -> Result<RunSummary, EngineError> {
        let token = self.tokens.valid_access_token().await;
        if token.is_empty() {
            tracing::warn!("access token gone; export not started");
            return Ok(self.finish(session, false, 0).await);
        }

        let documents = self
            .client
            .list_all_documents(&token, &source.id)
            .await
            .map_err(EngineError::Enumerate)?;
        let stamp = run_stamp()?;
        tracing::info!(
            documents = documents.len(),
            source = %source.name,
            destination = %destination.display(),
            "starting export"
        );

        self.name_counters.clear();
        session
            .update(|state| {
                state.export.reset();
                state
                    .export
                    .set_pending(documents.into_iter().map(ExportItem::from).collect());
                state.export_source = Some(source);
                state.export_destination = Some(destination);
                state.export_run_stamp = Some(stamp);
                state.export_metadata_requested = with_metadata;
                state.metadata_export_skipped = false;
            })
            .await?;
        self.resume(session).await
    }

    /// Continues the persisted pending list into the directory of the run
    /// that queued it.
    pub async fn resume(&mut self, session: &mut TransferSession) -> Result<RunSummary, EngineError> {
        let run_dir = run_dir(session)?;
        let with_metadata = session.state().export_metadata_requested;

        let mut processed = 0usize;
        let mut cancelled = false;
        while let Some(item) = session.state().export.head().cloned() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let token = self.tokens.valid_access_token().await;
            if token.is_empty() {
                tracing::warn!("access token gone; export stops here");
                break;
            }

            let outcome = self.process(&token, &item, &run_dir).await;
            processed += 1;
            match outcome {
                Ok(written) => {
                    tracing::debug!(path = %written.display(), "exported");
                    let metadata_written =
                        !with_metadata || append_metadata(&run_dir, &written, &item).await;
                    session
                        .update(|state| {
                            state.export.consume_head();
                            if !metadata_written {
                                state.metadata_export_skipped = true;
                            }
                        })
                        .await?;
                }
                Err(reason) => {
                    tracing::warn!(id = %item.remote_id, %reason, "export item failed");
                    session
                        .update(|state| {
                            state.export.move_head_to_error(reason);
                        })
                        .await?;
                }
            }
        }

        Ok(self.finish(session, cancelled, processed).await)
    }

    pub async fn retry_failed(
        &mut self,
        session: &mut TransferSession,
    ) -> Result<RunSummary, EngineError> {
        session
            .update(|state| state.export.drain_errors_to_pending())
            .await?;
        self.resume(session).await
    }

    async fn finish(
        &self,
        session: &TransferSession,
        cancelled: bool,
        processed: usize,
    ) -> RunSummary {
        let state = session.state();
        let failed_rows = state
            .export
            .failed()
            .iter()
            .map(|item| {
                vec![
                    item.title.clone(),
                    item.remote_relative_path.clone(),
                    item.reason.clone().unwrap_or_default(),
                ]
            })
            .collect();
        complete_run(
            self.tokens.as_ref(),
            RunEnd {
                direction: Direction::Export,
                cancelled,
                processed,
                failed_rows,
                remaining: state.export.pending_len(),
                metadata_exported: !state.metadata_export_skipped,
                report_dir: self.report_dir.as_deref(),
            },
        )
        .await
    }

    /// Returns the written file, or the failure reason.
    async fn process(
        &mut self,
        token: &str,
        item: &ExportItem,
        run_dir: &Path,
    ) -> Result<PathBuf, String> {
        let mut stage = Stage::ComputeDestDir;
        loop {
            stage = match stage {
                Stage::ComputeDestDir => {
                    let dir = match local_dir_for(run_dir, &item.remote_relative_path) {
                        Ok(dir) => dir,
                        Err(err) => return Err(err.to_string()),
                    };
                    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
                        return Err(err.to_string());
                    }
                    Stage::ComputeDestFilename { dir }
                }
                Stage::ComputeDestFilename { dir } => Stage::Download {
                    stem: sanitize_file_stem(&item.title, &item.remote_id),
                    dir,
                },
                Stage::Download { dir, stem } => {
                    match self.client.download_document_bytes(token, &item.remote_id).await {
                        Ok(bytes) => Stage::VerifyDigest { dir, stem, bytes },
                        Err(err) => return Err(format!("Download error: {err}")),
                    }
                }
                Stage::VerifyDigest { dir, stem, bytes } => {
                    let actual = md5_hex(&bytes);
                    if actual != item.expected_digest {
                        tracing::warn!(
                            id = %item.remote_id,
                            expected = %item.expected_digest,
                            %actual,
                            "digest mismatch"
                        );
                        return Err(REASON_MD5_MISMATCH.to_string());
                    }
                    Stage::Write { dir, stem, bytes }
                }
                Stage::Write { dir, stem, bytes } => {
                    return self
                        .write_unique(&dir, &stem, &item.file_extension, &bytes)
                        .await
                        .map_err(|err| err.to_string());
                }
            };
        }
    }

    /// Creates `<stem>.<ext>`, or the next free `<stem> (n).<ext>`, without
    /// ever replacing an existing file.
    async fn write_unique(
        &mut self,
        dir: &Path,
        stem: &str,
        extension: &str,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        let base = dir.join(numbered_file_name(stem, extension, 0));
        let mut target = base.clone();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(bytes).await?;
                        file.flush().await
                    }
                    .await;
                    if let Err(err) = written {
                        let _ = tokio::fs::remove_file(&target).await;
                        return Err(err);
                    }
                    return Ok(target);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    let counter = self.name_counters.entry(base.clone()).or_insert(0);
                    *counter += 1;
                    target = dir.join(numbered_file_name(stem, extension, *counter));
                }
                Err(err) => return Err(err),
            }
        }
    }

}

/// Adds one row to the run's metadata.csv. Returns false when the file could
/// not be written.
async fn append_metadata(run_dir: &Path, written: &Path, item: &ExportItem) -> bool {
    let relative = written.strip_prefix(run_dir).unwrap_or(written);
    let line = [
        relative.to_string_lossy().as_ref(),
        item.title.as_str(),
        item.note.as_str(),
        item.created_at.as_str(),
    ]
    .iter()
    .map(|field| csv_field(field))
    .collect::<Vec<_>>()
    .join(",");

    match append_line(&run_dir.join(METADATA_FILE_NAME), &line).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, "metadata.csv not written");
            false
        }
    }
}

fn run_dir(session: &TransferSession) -> Result<PathBuf, EngineError> {
    let state = session.state();
    match (&state.export_destination, &state.export_run_stamp) {
        (Some(destination), Some(stamp)) => Ok(destination.join(stamp)),
        _ => Err(EngineError::MissingExportDestination),
    }
}

fn run_stamp() -> Result<String, time::error::Format> {
    OffsetDateTime::now_utc().format(format_description!(
        "[year]-[month]-[day]_[hour]-[minute]-[second]"
    ))
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let fresh = !tokio::fs::try_exists(path).await?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    if fresh {
        file.write_all(METADATA_HEADER.as_bytes()).await?;
    }
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
