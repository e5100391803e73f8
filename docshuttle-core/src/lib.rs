mod client;

pub use client::{
    CreatedFolder, DmsClient, DmsError, DocumentPage, FOLDER_NAME_NOT_UNIQUE, FolderEntry,
    RemoteDocument, UploadAck, UploadMetadata,
};
