use std::path::Path;

use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool, migrate::Migrator, sqlite::SqliteConnectOptions};
use thiserror::Error;

use crate::transfer::session::SessionState;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const NAMESPACE: &str = "transfer";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored value for {key} is not valid JSON: {source}")]
    CorruptValue {
        key: String,
        source: serde_json::Error,
    },
    #[error("state encoded as {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Durable home of the transfer state. Every field of [`SessionState`] is
/// one row under the `transfer` namespace.
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn load(&self) -> Result<SessionState, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM app_state WHERE namespace = ?1")
            .bind(NAMESPACE)
            .fetch_all(&self.pool)
            .await?;

        let mut fields = Map::new();
        for row in rows {
            let key: String = row.try_get("key")?;
            let raw: String = row.try_get("value")?;
            let value = serde_json::from_str::<Value>(&raw).map_err(|source| {
                StoreError::CorruptValue {
                    key: key.clone(),
                    source,
                }
            })?;
            fields.insert(key, value);
        }
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    pub async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let fields = state_fields(serde_json::to_value(state)?)?;
        let now = now_unix();
        let mut tx = self.pool.begin().await?;
        for (key, value) in fields {
            sqlx::query(
                "INSERT INTO app_state (namespace, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
            )
            .bind(NAMESPACE)
            .bind(&key)
            .bind(value.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM app_state WHERE namespace = ?1")
            .bind(NAMESPACE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// One row per top-level field.
fn state_fields(value: Value) -> Result<Map<String, Value>, StoreError> {
    match value {
        Value::Object(fields) => Ok(fields),
        Value::Null => Err(StoreError::NotAnObject("null")),
        Value::Bool(_) => Err(StoreError::NotAnObject("a boolean")),
        Value::Number(_) => Err(StoreError::NotAnObject("a number")),
        Value::String(_) => Err(StoreError::NotAnObject("a string")),
        Value::Array(_) => Err(StoreError::NotAnObject("an array")),
    }
}

fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::items::{FolderDescriptor, ImportItem};
    use tempfile::tempdir;

    async fn make_store() -> StateStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = StateStore::from_pool(pool);
        store.init().await.unwrap();
        store
    }

    #[tokio::test]
    async fn empty_store_loads_default_state() {
        let store = make_store().await;
        let state = store.load().await.unwrap();
        assert_eq!(state, SessionState::default());
    }

    #[tokio::test]
    async fn save_then_load_preserves_queues_and_flags() {
        let store = make_store().await;
        let mut state = SessionState::default();
        state.import.set_pending(vec![
            ImportItem::new("/home/u/Scans/a.pdf", "/Scans", 1),
            ImportItem::new("/home/u/Scans/b.pdf", "/Scans", 2),
        ]);
        state.import.move_head_to_error("File not found (deleted, renamed or moved?)");
        state.import_destination = Some(FolderDescriptor::new("10", "Inbox"));
        state.metadata_export_skipped = true;

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, state);
        assert_eq!(loaded.import.pending_len(), 1);
        assert_eq!(loaded.import.failed_len(), 1);
    }

    #[tokio::test]
    async fn save_overwrites_previous_rows() {
        let store = make_store().await;
        let mut state = SessionState::default();
        state.export_run_stamp = Some("first".into());
        store.save(&state).await.unwrap();
        state.export_run_stamp = Some("second".into());
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.export_run_stamp.as_deref(), Some("second"));
    }

    #[test]
    fn non_object_state_is_an_error() {
        let err = state_fields(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject("an array")));

        let fields = state_fields(serde_json::to_value(SessionState::default()).unwrap()).unwrap();
        assert!(fields.contains_key("import"));
    }

    #[tokio::test]
    async fn clear_forgets_everything() {
        let store = make_store().await;
        let mut state = SessionState::default();
        state.metadata_export_skipped = true;
        store.save(&state).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.load().await.unwrap(), SessionState::default());
    }

    #[tokio::test]
    async fn state_survives_reopening_the_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested/state.db");
        let mut state = SessionState::default();
        state.export_destination = Some(dir.path().join("exports"));

        {
            let store = StateStore::open(&db_path).await.unwrap();
            store.save(&state).await.unwrap();
        }

        let reopened = StateStore::open(&db_path).await.unwrap();
        assert_eq!(reopened.load().await.unwrap(), state);
    }
}
