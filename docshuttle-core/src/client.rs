use std::collections::HashSet;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Error code the server returns when a folder name is already taken under
/// the requested parent.
pub const FOLDER_NAME_NOT_UNIQUE: &str = "folder_name_not_unique";

#[derive(Debug, Error)]
pub enum DmsError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("api returned {status}: {body}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        body: String,
    },
    #[error("document listing returned page cursor {0:?} twice")]
    PageLoop(String),
}

impl DmsError {
    /// `true` only for the "name not unique under parent" rejection of a
    /// folder creation. Every other failure is treated as fatal by callers.
    pub fn is_name_conflict(&self) -> bool {
        matches!(
            self,
            DmsError::Api { code: Some(code), .. } if code == FOLDER_NAME_NOT_UNIQUE
        )
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DmsError::Api { status, .. } => Some(*status),
            DmsError::Request(err) => err.status(),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct DmsClient {
    http: Client,
    base_url: Url,
}

impl DmsClient {
    pub fn new(base_url: &str) -> Result<Self, DmsError> {
        Self::with_http(Client::new(), base_url)
    }

    pub fn with_http(http: Client, base_url: &str) -> Result<Self, DmsError> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    pub async fn list_folders(
        &self,
        token: &str,
        parent_id: &str,
    ) -> Result<Vec<FolderEntry>, DmsError> {
        let url = self.endpoint(&format!("/api/folders/{parent_id}/children/"))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<CreatedFolder, DmsError> {
        let url = self.endpoint("/api/folders/")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&NewFolder {
                name,
                parent: parent_id,
            })
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_documents(
        &self,
        token: &str,
        folder_id: &str,
        page: Option<&str>,
    ) -> Result<DocumentPage, DmsError> {
        let mut url = self.endpoint(&format!("/api/folders/{folder_id}/documents/"))?;
        if let Some(page) = page {
            url.query_pairs_mut().append_pair("page", page);
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Follows the `next` cursor until the server reports the last page.
    /// Any failing page fails the whole listing.
    pub async fn list_all_documents(
        &self,
        token: &str,
        folder_id: &str,
    ) -> Result<Vec<RemoteDocument>, DmsError> {
        let mut documents = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .list_documents(token, folder_id, cursor.as_deref())
                .await?;
            documents.extend(page.results);
            match page.next {
                Some(next) => {
                    if !seen.insert(next.clone()) {
                        return Err(DmsError::PageLoop(next));
                    }
                    cursor = Some(next);
                }
                None => break,
            }
        }
        Ok(documents)
    }

    pub async fn upload_document(
        &self,
        token: &str,
        metadata: &UploadMetadata,
        file_name: &str,
        bytes: Vec<u8>,
        thumbnail: Option<&str>,
    ) -> Result<UploadAck, DmsError> {
        let url = self.endpoint("/api/documents/upload/")?;
        let file = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;
        let mut form = Form::new()
            .text("metadata", serde_json::to_string(metadata)?)
            .part("file", file);
        if let Some(thumbnail) = thumbnail {
            form = form.text("thumbnail", thumbnail.to_string());
        }
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        // Some deployments answer 201 with an empty body.
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(UploadAck::default());
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn download_document_bytes(
        &self,
        token: &str,
        pid: &str,
    ) -> Result<Vec<u8>, DmsError> {
        let url = self.endpoint(&format!("/api/documents/{pid}/download/"))?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.bytes().await?.to_vec())
    }

    fn endpoint(&self, path: &str) -> Result<Url, DmsError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DmsError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> DmsError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let code = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.code);
        DmsError::Api { status, code, body }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewFolder<'a> {
    name: &'a str,
    parent: &'a str,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FolderEntry {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub has_descendant: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CreatedFolder {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteDocument {
    #[serde(deserialize_with = "id_string")]
    pub pid: String,
    pub title: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub created: String,
    /// Folder path relative to the listed folder, `/`-separated.
    #[serde(default)]
    pub path: String,
    pub md5: String,
    #[serde(default)]
    pub ext: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentPage {
    pub results: Vec<RemoteDocument>,
    #[serde(default, deserialize_with = "opt_cursor")]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadMetadata {
    pub folder: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub md5: String,
    pub modified: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadAck {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub pid: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

// Page cursors arrive either as page numbers or as opaque tokens.
fn opt_cursor<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?
        .map(String::from)
        .filter(|cursor| !cursor.is_empty()))
}
