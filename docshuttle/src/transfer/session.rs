use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::items::{ExportItem, FolderDescriptor, ImportItem};
use super::queue::{QueueProgress, TransferQueue};
use crate::store::{StateStore, StoreError};

/// Everything that has to survive a restart for a run to be resumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub import: TransferQueue<ImportItem>,
    pub export: TransferQueue<ExportItem>,
    pub import_destination: Option<FolderDescriptor>,
    pub export_source: Option<FolderDescriptor>,
    pub export_destination: Option<PathBuf>,
    pub export_run_stamp: Option<String>,
    pub export_metadata_requested: bool,
    pub metadata_export_skipped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub import: QueueProgress,
    pub export: QueueProgress,
}

impl SessionState {
    fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            import: self.import.progress(),
            export: self.export.progress(),
        }
    }
}

/// Transfer state owned by whoever drives a run. Mutations are saved to the
/// store before `update` returns, so an abrupt exit loses at most the item
/// in flight.
pub struct TransferSession {
    store: StateStore,
    state: SessionState,
    progress: watch::Sender<ProgressSnapshot>,
}

impl TransferSession {
    pub async fn load(store: StateStore) -> Result<Self, StoreError> {
        let state = store.load().await?;
        let (progress, _) = watch::channel(state.progress());
        Ok(Self {
            store,
            state,
            progress,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Applies `mutate` to a copy and keeps it only once it is saved. On a
    /// store error the session still holds the last persisted state.
    pub async fn update<R>(
        &mut self,
        mutate: impl FnOnce(&mut SessionState) -> R,
    ) -> Result<R, StoreError> {
        let mut next = self.state.clone();
        let result = mutate(&mut next);
        self.store.save(&next).await?;
        self.state = next;
        self.progress.send_replace(self.state.progress());
        Ok(result)
    }

    pub fn has_resumable_import(&self) -> bool {
        self.state.import.pending_len() > 0
    }

    pub fn has_resumable_export(&self) -> bool {
        self.state.export.pending_len() > 0
    }

    /// Forgets both queues and every remembered run detail.
    pub async fn reset(&mut self) -> Result<(), StoreError> {
        self.store.clear().await?;
        self.state = SessionState::default();
        self.progress.send_replace(self.state.progress());
        Ok(())
    }
}
