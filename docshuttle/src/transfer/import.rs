use std::path::PathBuf;
use std::sync::Arc;

use docshuttle_core::{DmsClient, UploadMetadata};
use tokio_util::sync::CancellationToken;

use super::folders::{FolderPathCache, FolderResolver};
use super::items::{FolderDescriptor, ImportItem};
use super::metadata::MetadataIndex;
use super::outcome::{
    Direction, EngineError, REASON_FILE_NOT_FOUND, REASON_FOLDER_CREATION,
    REASON_UPLOAD, RunEnd, RunSummary, complete_run,
};
use super::session::TransferSession;
use super::thumbnail::ThumbnailRenderer;
use crate::hasher::{md5_hex, path_digest};
use crate::token::AccessTokenSource;

/// Steps one import item goes through, in order. Each step either hands
/// its data to the next one or fails the item.
enum Stage {
    ResolvingFolder,
    ReadingHashing { folder_id: String },
    MatchingMetadata { folder_id: String, bytes: Vec<u8> },
    Thumbnailing { upload: PreparedUpload },
    Uploading { upload: PreparedUpload, thumbnail: Option<String> },
}

struct PreparedUpload {
    metadata: UploadMetadata,
    bytes: Vec<u8>,
}

/// Uploads local files into a remote folder tree, one item at a time.
pub struct ImportEngine {
    client: DmsClient,
    tokens: Arc<dyn AccessTokenSource>,
    metadata: MetadataIndex,
    thumbnails: Option<Arc<dyn ThumbnailRenderer>>,
    report_dir: Option<PathBuf>,
    folders: FolderPathCache,
    cancel: CancellationToken,
}

impl ImportEngine {
    pub fn new(client: DmsClient, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            client,
            tokens,
            metadata: MetadataIndex::default(),
            thumbnails: None,
            report_dir: None,
            folders: FolderPathCache::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataIndex) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_thumbnails(mut self, renderer: Arc<dyn ThumbnailRenderer>) -> Self {
        self.thumbnails = Some(renderer);
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Cancelling the returned token stops the run before the next item.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn folder_cache(&self) -> &FolderPathCache {
        &self.folders
    }

    /// Replaces whatever import was queued with `items` and runs it.
    ///
    /// Matched metadata is stored on each item before it is queued, so a
    /// later resume or retry uploads it without the index.
    pub async fn start(
        &mut self,
        session: &mut TransferSession,
        mut items: Vec<ImportItem>,
        destination: FolderDescriptor,
    ) -> Result<RunSummary, EngineError> {
        self.folders.clear();
        for item in &mut items {
            self.attach_metadata(item);
        }
        tracing::info!(
            items = items.len(),
            destination = %destination.name,
            "starting import"
        );
        session
            .update(|state| {
                state.import.reset();
                state.import.set_pending(items);
                state.import_destination = Some(destination);
            })
            .await?;
        self.resume(session).await
    }

    /// Continues the persisted pending list.
    pub async fn resume(&mut self, session: &mut TransferSession) -> Result<RunSummary, EngineError> {
        let destination = session
            .state()
            .import_destination
            .clone()
            .ok_or(EngineError::MissingImportDestination)?;

        let mut processed = 0usize;
        let mut cancelled = false;
        while let Some(head) = session.state().import.head().cloned() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let token = self.tokens.valid_access_token().await;
            if token.is_empty() {
                tracing::warn!("access token gone; import stops here");
                break;
            }

            let mut item = head;
            let outcome = self.process(&token, &mut item, &destination.id).await;
            processed += 1;
            match outcome {
                Ok(()) => {
                    tracing::debug!(path = %item.local_path.display(), "uploaded");
                    session
                        .update(|state| {
                            state.import.consume_head();
                        })
                        .await?;
                }
                Err(reason) => {
                    tracing::warn!(path = %item.local_path.display(), %reason, "import item failed");
                    session
                        .update(move |state| {
                            state.import.replace_head(item);
                            state.import.move_head_to_error(reason);
                        })
                        .await?;
                }
            }
        }

        let state = session.state();
        let failed_rows = state
            .import
            .failed()
            .iter()
            .map(|item| {
                vec![
                    item.file_name(),
                    item.local_path.display().to_string(),
                    item.reason.clone().unwrap_or_default(),
                ]
            })
            .collect();
        Ok(complete_run(
            self.tokens.as_ref(),
            RunEnd {
                direction: Direction::Import,
                cancelled,
                processed,
                failed_rows,
                remaining: state.import.pending_len(),
                metadata_exported: true,
                report_dir: self.report_dir.as_deref(),
            },
        )
        .await)
    }

    /// Moves every failed item back to pending and runs again.
    pub async fn retry_failed(
        &mut self,
        session: &mut TransferSession,
    ) -> Result<RunSummary, EngineError> {
        session
            .update(|state| state.import.drain_errors_to_pending())
            .await?;
        self.resume(session).await
    }

    /// Overwrites title and note only when the index knows the file.
    fn attach_metadata(&self, item: &mut ImportItem) {
        if let Some(found) = self.metadata.lookup(&path_digest(&item.local_path)) {
            item.title = found.document_title.clone();
            item.note = found.document_notes.clone();
        }
    }

    /// Drives `item` through every stage, recording what it learns on the
    /// item. Returns the failure reason when a stage fails.
    async fn process(
        &mut self,
        token: &str,
        item: &mut ImportItem,
        root_id: &str,
    ) -> Result<(), String> {
        let mut stage = Stage::ResolvingFolder;
        loop {
            stage = match stage {
                Stage::ResolvingFolder => {
                    let resolver = FolderResolver::new(&self.client, token);
                    match resolver
                        .resolve_or_create(&mut self.folders, &item.relative_folder_path, root_id)
                        .await
                    {
                        Ok(folder_id) => {
                            item.resolved_folder_id = Some(folder_id.clone());
                            Stage::ReadingHashing { folder_id }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "remote folder unavailable");
                            return Err(REASON_FOLDER_CREATION.to_string());
                        }
                    }
                }
                Stage::ReadingHashing { folder_id } => match tokio::fs::read(&item.local_path).await {
                    Ok(bytes) => {
                        item.digest = Some(md5_hex(&bytes));
                        Stage::MatchingMetadata { folder_id, bytes }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "cannot read local file");
                        return Err(REASON_FILE_NOT_FOUND.to_string());
                    }
                },
                Stage::MatchingMetadata { folder_id, bytes } => {
                    self.attach_metadata(item);
                    Stage::Thumbnailing {
                        upload: PreparedUpload {
                            metadata: UploadMetadata {
                                folder: folder_id,
                                file_name: item.file_name(),
                                title: item.title.clone(),
                                note: item.note.clone(),
                                md5: item.digest.clone().unwrap_or_default(),
                                modified: item.last_modified,
                            },
                            bytes,
                        },
                    }
                }
                Stage::Thumbnailing { upload } => {
                    let thumbnail = match self.thumbnails.clone() {
                        Some(renderer) => {
                            render_thumbnail(renderer, item.local_path.clone(), upload.bytes.clone())
                                .await
                        }
                        None => None,
                    };
                    Stage::Uploading { upload, thumbnail }
                }
                Stage::Uploading { upload, thumbnail } => {
                    let PreparedUpload { metadata, bytes } = upload;
                    return match self
                        .client
                        .upload_document(
                            token,
                            &metadata,
                            &metadata.file_name,
                            bytes,
                            thumbnail.as_deref(),
                        )
                        .await
                    {
                        Ok(_) => Ok(()),
                        Err(err) => {
                            tracing::warn!(error = %err, "upload rejected");
                            Err(REASON_UPLOAD.to_string())
                        }
                    };
                }
            };
        }
    }
}

/// Decoding and scaling run on the blocking pool.
async fn render_thumbnail(
    renderer: Arc<dyn ThumbnailRenderer>,
    path: PathBuf,
    bytes: Vec<u8>,
) -> Option<String> {
    match tokio::task::spawn_blocking(move || renderer.render(&path, &bytes)).await {
        Ok(Ok(thumbnail)) => Some(thumbnail),
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "no thumbnail");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "thumbnail task failed");
            None
        }
    }
}

#[cfg(test)]
#[path = "import_tests.rs"]
mod tests;
