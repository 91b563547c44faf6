//! Raw key-value backends for the store adapter.
//!
//! A backend only moves strings in and out; all JSON handling, backup and
//! recovery lives in [`super::Store`].

use crate::{
    entities::{StorageEntry, storage_entry},
    errors::{Error, Result},
};
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait, Set, sea_query::OnConflict};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument};

/// String-in, string-out persistence used by [`super::Store`].
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Returns the raw value stored under `key`, if any.
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;
    /// Writes `value` under `key`, replacing any previous value.
    async fn set_raw(&self, key: &str, value: &str) -> Result<()>;
    /// Removes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Backend over the `storage_entries` table.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db: DatabaseConnection,
}

impl SqliteBackend {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let entry = StorageEntry::find_by_id(key.to_string()).one(&self.db).await?;
        debug!("Loaded key '{}' (present: {})", key, entry.is_some());
        Ok(entry.map(|e| e.value))
    }

    #[instrument(skip(self, value))]
    async fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let model = storage_entry::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(chrono::Utc::now()),
        };

        // UPSERT on the key
        StorageEntry::insert(model)
            .on_conflict(
                OnConflict::column(storage_entry::Column::Key)
                    .update_columns([storage_entry::Column::Value, storage_entry::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<()> {
        StorageEntry::delete_by_id(key.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

/// In-process backend. Used for tests and as the fallback when no local
/// database can be opened.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose writes always fail, simulating an exhausted quota.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            read_only: true,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| Error::Persistence {
            message: "Failed to acquire memory store lock".to_string(),
        })
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::Persistence {
                message: format!("Storage quota exceeded writing '{key}'"),
            });
        }
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_sqlite_backend_set_get_remove() -> Result<()> {
        let db = setup_test_db().await?;
        let backend = SqliteBackend::new(db);

        assert!(backend.get_raw("cheques").await?.is_none());

        backend.set_raw("cheques", "[]").await?;
        assert_eq!(backend.get_raw("cheques").await?.as_deref(), Some("[]"));

        // Second write replaces the first
        backend.set_raw("cheques", "[1]").await?;
        assert_eq!(backend.get_raw("cheques").await?.as_deref(), Some("[1]"));

        backend.remove("cheques").await?;
        assert!(backend.get_raw("cheques").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_only_memory_backend_rejects_writes() {
        let backend = MemoryBackend::read_only();
        let result = backend.set_raw("receitas", "[]").await;
        assert!(matches!(result, Err(Error::Persistence { .. })));
    }
}
