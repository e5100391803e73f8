use std::path::PathBuf;

use docshuttle_core::RemoteDocument;
use serde::{Deserialize, Serialize};

use super::queue::QueueItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportItem {
    pub local_path: PathBuf,
    /// `/`-separated; the first segment is an anchor, the second is the
    /// selected root folder.
    pub relative_folder_path: String,
    pub last_modified: i64,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub resolved_folder_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ImportItem {
    pub fn new(
        local_path: impl Into<PathBuf>,
        relative_folder_path: impl Into<String>,
        last_modified: i64,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            relative_folder_path: relative_folder_path.into(),
            last_modified,
            digest: None,
            resolved_folder_id: None,
            title: None,
            note: None,
            reason: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl QueueItem for ImportItem {
    fn set_reason(&mut self, reason: String) {
        self.reason = Some(reason);
    }

    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportItem {
    pub remote_id: String,
    pub title: String,
    pub note: String,
    pub created_at: String,
    pub remote_relative_path: String,
    pub expected_digest: String,
    pub file_extension: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<RemoteDocument> for ExportItem {
    fn from(document: RemoteDocument) -> Self {
        Self {
            remote_id: document.pid,
            title: document.title,
            note: document.note,
            created_at: document.created,
            remote_relative_path: document.path,
            expected_digest: document.md5,
            file_extension: document.ext,
            reason: None,
        }
    }
}

impl QueueItem for ExportItem {
    fn set_reason(&mut self, reason: String) {
        self.reason = Some(reason);
    }

    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// A remote folder the user picked as import destination or export source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    pub id: String,
    pub name: String,
}

impl FolderDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
