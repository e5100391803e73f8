use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::hasher::path_digest;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub document_notes: Option<String>,
}

/// CSV-sourced metadata keyed by the digest of the local file path.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    by_digest: HashMap<String, DocumentMetadata>,
}

impl MetadataIndex {
    /// Takes the parser's `{digest: {documentTitle, documentNotes}}` map as is.
    pub fn from_digest_map(by_digest: HashMap<String, DocumentMetadata>) -> Self {
        Self { by_digest }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_digest_map(serde_json::from_str(raw)?))
    }

    pub fn from_rows<I, P>(rows: I) -> Self
    where
        I: IntoIterator<Item = (P, Option<String>, Option<String>)>,
        P: AsRef<Path>,
    {
        let by_digest = rows
            .into_iter()
            .map(|(path, title, notes)| {
                (
                    path_digest(path.as_ref()),
                    DocumentMetadata {
                        document_title: title,
                        document_notes: notes,
                    },
                )
            })
            .collect();
        Self { by_digest }
    }

    pub fn lookup(&self, digest: &str) -> Option<&DocumentMetadata> {
        self.by_digest.get(digest)
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}
