use std::collections::HashMap;

use docshuttle_core::{DmsClient, DmsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("failed to create remote folder {path}: {source}")]
    Creation { path: String, source: DmsError },
    #[error("folder {name:?} reported as existing under {parent} but was not found")]
    Lookup { parent: String, name: String },
    #[error("failed to list children of folder {parent}: {source}")]
    Listing { parent: String, source: DmsError },
}

/// Cumulative folder path -> remote folder id, scoped to one run.
#[derive(Debug, Default, Clone)]
pub struct FolderPathCache {
    entries: HashMap<String, String>,
}

impl FolderPathCache {
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    /// First mapping wins; folders are not renamed during a run.
    pub fn insert(&mut self, path: String, id: String) {
        self.entries.entry(path).or_insert(id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct FolderResolver<'a> {
    client: &'a DmsClient,
    token: &'a str,
}

impl<'a> FolderResolver<'a> {
    pub fn new(client: &'a DmsClient, token: &'a str) -> Self {
        Self { client, token }
    }

    /// Returns the id of the deepest folder of `relative_folder_path`,
    /// creating missing folders under `root_folder_id`.
    ///
    /// The first segment is an anchor and is skipped; the second is the
    /// user-selected root, which maps to `root_folder_id` without a remote
    /// call.
    pub async fn resolve_or_create(
        &self,
        cache: &mut FolderPathCache,
        relative_folder_path: &str,
        root_folder_id: &str,
    ) -> Result<String, FolderError> {
        let mut segments = relative_folder_path.split('/').skip(1);
        let Some(root_segment) = segments.next() else {
            return Ok(root_folder_id.to_string());
        };

        let mut key = format!("{root_folder_id}/{root_segment}");
        let mut parent_id = root_folder_id.to_string();
        for segment in segments.filter(|s| !s.is_empty()) {
            key.push('/');
            key.push_str(segment);

            if let Some(cached) = cache.get(&key) {
                parent_id = cached.to_string();
                continue;
            }

            let folder_id = match self.client.create_folder(self.token, segment, &parent_id).await {
                Ok(created) => created.id,
                Err(err) if err.is_name_conflict() => self.folder_id(&parent_id, segment).await?,
                Err(source) => {
                    return Err(FolderError::Creation {
                        path: key,
                        source,
                    });
                }
            };
            tracing::debug!(path = %key, id = %folder_id, "remote folder resolved");
            cache.insert(key.clone(), folder_id.clone());
            parent_id = folder_id;
        }

        Ok(parent_id)
    }

    /// Id of the child folder named `name` under `parent_id`.
    pub async fn folder_id(&self, parent_id: &str, name: &str) -> Result<String, FolderError> {
        let children = self
            .client
            .list_folders(self.token, parent_id)
            .await
            .map_err(|source| FolderError::Listing {
                parent: parent_id.to_string(),
                source,
            })?;
        children
            .into_iter()
            .find(|child| child.name == name)
            .map(|child| child.id)
            .ok_or_else(|| FolderError::Lookup {
                parent: parent_id.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_create(server: &MockServer, name: &str, parent: &str, id: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/folders/"))
            .and(body_json(json!({"name": name, "parent": parent})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": id})))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn creates_only_segments_below_the_selected_root() {
        let server = MockServer::start().await;
        mount_create(&server, "b", "root-id", "b-id", 1).await;
        mount_create(&server, "c", "b-id", "c-id", 1).await;

        let client = DmsClient::new(&server.uri()).unwrap();
        let resolver = FolderResolver::new(&client, "test-token");
        let mut cache = FolderPathCache::default();

        let id = resolver
            .resolve_or_create(&mut cache, "root/a/b/c", "root-id")
            .await
            .unwrap();

        assert_eq!(id, "c-id");
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("root-id/a/b"), Some("b-id"));
        assert_eq!(cache.get("root-id/a/b/c"), Some("c-id"));
    }

    #[tokio::test]
    async fn warm_cache_issues_no_calls() {
        let server = MockServer::start().await;
        mount_create(&server, "b", "root-id", "b-id", 1).await;
        mount_create(&server, "c", "b-id", "c-id", 1).await;

        let client = DmsClient::new(&server.uri()).unwrap();
        let resolver = FolderResolver::new(&client, "test-token");
        let mut cache = FolderPathCache::default();

        resolver
            .resolve_or_create(&mut cache, "root/a/b/c", "root-id")
            .await
            .unwrap();
        let again = resolver
            .resolve_or_create(&mut cache, "root/a/b/c", "root-id")
            .await
            .unwrap();

        assert_eq!(again, "c-id");
        // `expect(1)` on each mock is verified when the server drops.
    }

    #[tokio::test]
    async fn file_in_selected_root_needs_no_remote_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = DmsClient::new(&server.uri()).unwrap();
        let resolver = FolderResolver::new(&client, "test-token");
        let mut cache = FolderPathCache::default();

        for input in ["/Scans", "root", "", "/Scans/"] {
            let id = resolver
                .resolve_or_create(&mut cache, input, "root-id")
                .await
                .unwrap();
            assert_eq!(id, "root-id");
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn existing_folder_is_looked_up_once_and_used_as_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/folders/"))
            .and(body_json(json!({"name": "b", "parent": "root-id"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "folder_name_not_unique"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/folders/root-id/children/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "x-id", "name": "x", "has_descendant": false},
                {"id": "b-existing", "name": "b", "has_descendant": true}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        mount_create(&server, "c", "b-existing", "c-id", 1).await;

        let client = DmsClient::new(&server.uri()).unwrap();
        let resolver = FolderResolver::new(&client, "test-token");
        let mut cache = FolderPathCache::default();

        let id = resolver
            .resolve_or_create(&mut cache, "root/a/b/c", "root-id")
            .await
            .unwrap();

        assert_eq!(id, "c-id");
        assert_eq!(cache.get("root-id/a/b"), Some("b-existing"));
    }

    #[tokio::test]
    async fn conflict_without_matching_child_is_a_lookup_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/folders/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "folder_name_not_unique"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/folders/root-id/children/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = DmsClient::new(&server.uri()).unwrap();
        let resolver = FolderResolver::new(&client, "test-token");
        let mut cache = FolderPathCache::default();

        let err = resolver
            .resolve_or_create(&mut cache, "/a/b", "root-id")
            .await
            .expect_err("expected lookup failure");

        assert!(matches!(err, FolderError::Lookup { ref name, .. } if name == "b"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn other_failures_abort_without_caching() {
        let server = MockServer::start().await;
        mount_create(&server, "b", "root-id", "b-id", 1).await;
        Mock::given(method("POST"))
            .and(path("/api/folders/"))
            .and(body_json(json!({"name": "c", "parent": "b-id"})))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": "permission_denied"
            })))
            .mount(&server)
            .await;

        let client = DmsClient::new(&server.uri()).unwrap();
        let resolver = FolderResolver::new(&client, "test-token");
        let mut cache = FolderPathCache::default();

        let err = resolver
            .resolve_or_create(&mut cache, "root/a/b/c", "root-id")
            .await
            .expect_err("expected creation failure");

        assert!(matches!(err, FolderError::Creation { ref path, .. } if path == "root-id/a/b/c"));
        assert_eq!(cache.get("root-id/a/b"), Some("b-id"));
        assert_eq!(cache.get("root-id/a/b/c"), None);
    }

    #[test]
    fn cache_keeps_the_first_mapping() {
        let mut cache = FolderPathCache::default();
        cache.insert("r/a/b".into(), "1".into());
        cache.insert("r/a/b".into(), "2".into());
        assert_eq!(cache.get("r/a/b"), Some("1"));
    }
}
