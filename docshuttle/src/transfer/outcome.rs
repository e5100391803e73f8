use std::fmt;
use std::path::{Path, PathBuf};

use docshuttle_core::DmsError;
use thiserror::Error;

use crate::report::{self, ErrorReport};
use crate::store::StoreError;
use crate::token::AccessTokenSource;

pub const REASON_FOLDER_CREATION: &str = "Parent folder creation failed";
pub const REASON_FILE_NOT_FOUND: &str = "File not found (deleted, renamed or moved?)";
pub const REASON_UPLOAD: &str = "Upload error (corrupt file, network error?)";
pub const REASON_MD5_MISMATCH: &str = "md5 mismatch";

/// Conditions that stop a run. Per-item failures never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
    #[error("listing remote documents failed: {0}")]
    Enumerate(#[source] DmsError),
    #[error("no import destination recorded; start a new import")]
    MissingImportDestination,
    #[error("no export destination recorded; start a new export")]
    MissingExportDestination,
    #[error("time formatting error: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Import,
    Export,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Import => write!(f, "import"),
            Direction::Export => write!(f, "export"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded,
    CompletedWithErrors,
    /// The login session went away; remaining items wait for a resume.
    Interrupted,
    /// The user asked to stop between items.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub direction: Direction,
    pub outcome: RunOutcome,
    pub processed: usize,
    pub failed: usize,
    pub remaining: usize,
    pub report: Option<PathBuf>,
    pub metadata_exported: bool,
}

impl RunSummary {
    pub fn message(&self) -> String {
        let noun = match self.direction {
            Direction::Import => "Import",
            Direction::Export => "Export",
        };
        let mut head = match self.outcome {
            RunOutcome::Succeeded => format!("{noun} completed"),
            RunOutcome::CompletedWithErrors => {
                format!("{noun} completed with {} error(s)", self.failed)
            }
            RunOutcome::Interrupted => format!("{noun} interrupted"),
            RunOutcome::Cancelled => format!("{noun} paused"),
        };
        if !self.metadata_exported {
            head.push_str(" and metadata not exported");
        }
        let tail = match self.outcome {
            RunOutcome::Succeeded => String::new(),
            RunOutcome::CompletedWithErrors => match &self.report {
                Some(path) => format!(
                    " See {} for details, then retry the failed documents.",
                    path.display()
                ),
                None => " Retry the failed documents.".to_string(),
            },
            RunOutcome::Interrupted => " Log in again, then resume.".to_string(),
            RunOutcome::Cancelled => format!(" {} document(s) left to resume.", self.remaining),
        };
        format!("{head}.{tail}")
    }
}

pub(crate) struct RunEnd<'a> {
    pub direction: Direction,
    pub cancelled: bool,
    pub processed: usize,
    pub failed_rows: Vec<Vec<String>>,
    pub remaining: usize,
    pub metadata_exported: bool,
    pub report_dir: Option<&'a Path>,
}

/// Decides how a finished run is reported. An empty token wins over
/// everything else; a report is only produced for an uninterrupted run with
/// failures.
pub(crate) async fn complete_run(tokens: &dyn AccessTokenSource, end: RunEnd<'_>) -> RunSummary {
    let failed = end.failed_rows.len();
    let session_alive = !tokens.valid_access_token().await.is_empty();
    let outcome = if !session_alive {
        RunOutcome::Interrupted
    } else if end.cancelled {
        RunOutcome::Cancelled
    } else if failed > 0 {
        RunOutcome::CompletedWithErrors
    } else {
        RunOutcome::Succeeded
    };

    let report = match (outcome, end.report_dir) {
        (RunOutcome::CompletedWithErrors, Some(dir)) => {
            let rendered = ErrorReport::new(
                vec!["Name".into(), "Path".into(), "Reason".into()],
                end.failed_rows,
            )
            .build();
            match report::save(&rendered, dir).await {
                Ok(path) => Some(path),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to save error report");
                    None
                }
            }
        }
        _ => None,
    };

    let summary = RunSummary {
        direction: end.direction,
        outcome,
        processed: end.processed,
        failed,
        remaining: end.remaining,
        report,
        metadata_exported: end.metadata_exported,
    };
    tracing::info!(
        direction = %summary.direction,
        outcome = ?summary.outcome,
        processed = summary.processed,
        failed = summary.failed,
        remaining = summary.remaining,
        "run finished"
    );
    summary
}
