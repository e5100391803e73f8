pub mod export;
pub mod folders;
pub mod import;
pub mod items;
pub mod metadata;
pub mod outcome;
pub mod paths;
pub mod queue;
pub mod selection;
pub mod session;
pub mod thumbnail;

pub use export::ExportEngine;
pub use import::ImportEngine;
pub use items::{ExportItem, FolderDescriptor, ImportItem};
pub use outcome::{Direction, EngineError, RunOutcome, RunSummary};
pub use session::{ProgressSnapshot, SessionState, TransferSession};
