//! Persistent store adapter.
//!
//! [`Store`] is the key-value surface every repository sits on. Reads never
//! fail from the caller's point of view: a corrupted document is copied to
//! `{key}_backup` and the caller's default is returned. Writes report success
//! as a `bool` and log failures instead of raising them.
//!
//! Date revival happens in the typed deserialization pass: every date field in
//! [`crate::models`] is a `DateTime<Utc>` read through
//! [`crate::models::dates`], so a document either parses into fully typed
//! values or is rejected as a whole.

pub mod backend;
pub mod debounce;
pub mod remote;
pub mod repository;

pub use backend::{KeyValueBackend, MemoryBackend, SqliteBackend};
pub use debounce::{DEFAULT_DEBOUNCE, Debouncer};
pub use remote::{RemoteStore, SeaOrmRemote};
pub use repository::{Record, Repository};

use crate::errors::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Persisted keys.
pub mod keys {
    pub const FORNECEDORES: &str = "fornecedores";
    pub const USERS: &str = "users";
    pub const CURRENT_USER: &str = "currentUser";
    pub const FUNDOS_MANEIO: &str = "fundosManeio";
    pub const RECEITAS: &str = "receitas";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const WORKFLOW_CONFIG: &str = "workflowConfig";
    pub const CHEQUES: &str = "cheques";
    pub const TRANSACOES_BANCARIAS: &str = "transacoesBancarias";
    pub const ORCAMENTOS: &str = "orcamentos";
    pub const EVENTOS_FISCAIS: &str = "eventosFiscais";
}

/// Name of the key holding the last corrupted value of `key`.
#[must_use]
pub fn backup_key(key: &str) -> String {
    format!("{key}_backup")
}

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn KeyValueBackend>,
    debouncer: Arc<Debouncer>,
}

impl Store {
    pub fn new(backend: Arc<dyn KeyValueBackend>, debounce: Duration) -> Self {
        let debouncer = Arc::new(Debouncer::new(Arc::clone(&backend), debounce));
        Self { backend, debouncer }
    }

    /// A store over a fresh [`MemoryBackend`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), DEFAULT_DEBOUNCE)
    }

    async fn read_raw(&self, key: &str) -> Result<Option<String>> {
        if let Some(pending) = self.debouncer.pending_value(key).await {
            return Ok(Some(pending));
        }
        self.backend.get_raw(key).await
    }

    /// Reads and parses `key`. `Ok(None)` when the key is absent.
    ///
    /// # Errors
    /// Returns the backend error, or `Error::Serialization` when the stored
    /// document does not match `T`.
    pub async fn parse<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_raw(key).await? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    /// Loads `key`, falling back to `default` on any failure.
    pub async fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.read_raw(key).await {
            Ok(Some(raw)) if !raw.trim().is_empty() => raw,
            Ok(_) => return default,
            Err(e) => {
                error!("Failed to read '{}' from the store: {}", key, e);
                return default;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                error!("Corrupted data under '{}': {}", key, e);
                let backup = backup_key(key);
                match self.backend.set_raw(&backup, &raw).await {
                    Ok(()) => warn!("Corrupted '{}' copied to '{}'", key, backup),
                    Err(e) => error!("Failed to back up corrupted '{}': {}", key, e),
                }
                default
            }
        }
    }

    /// Serializes and writes `value` under `key` immediately.
    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to serialize '{}': {}", key, e);
                return false;
            }
        };

        if self.debouncer.cancel(key).await {
            trace!("Immediate save of '{}' supersedes a pending write", key);
        }
        match self.backend.set_raw(key, &raw).await {
            Ok(()) => {
                debug!("Saved '{}' ({} bytes)", key, raw.len());
                true
            }
            Err(e) => {
                error!("Failed to save '{}': {}", key, e);
                false
            }
        }
    }

    /// Queues a debounced write of `value` under `key`.
    pub async fn schedule_save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => {
                self.debouncer.schedule(key, raw).await;
                true
            }
            Err(e) => {
                error!("Failed to serialize '{}': {}", key, e);
                false
            }
        }
    }

    /// Writes all debounced values now.
    pub async fn flush(&self) -> usize {
        self.debouncer.flush().await
    }

    /// Backs up and removes `key`.
    pub async fn clear(&self, key: &str) -> bool {
        match self.read_raw(key).await {
            Ok(Some(raw)) => {
                if let Err(e) = self.backend.set_raw(&backup_key(key), &raw).await {
                    error!("Failed to back up '{}' before clearing: {}", key, e);
                    return false;
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!("Failed to read '{}' before clearing: {}", key, e);
                return false;
            }
        }

        self.debouncer.cancel(key).await;
        match self.backend.remove(key).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to clear '{}': {}", key, e);
                false
            }
        }
    }

    /// Removes `key` without a backup.
    pub async fn remove(&self, key: &str) -> bool {
        self.debouncer.cancel(key).await;
        self.backend
            .remove(key)
            .await
            .inspect_err(|e| error!("Failed to remove '{}': {}", key, e))
            .is_ok()
    }

}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

/// Maps a failed local write to a persistence error for callers that must
/// not continue without it.
pub(crate) fn ensure_saved(saved: bool, key: &str) -> Result<()> {
    if saved {
        Ok(())
    } else {
        Err(Error::Persistence {
            message: format!("Failed to write '{key}'"),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::models::dates;
    use chrono::{DateTime, TimeZone, Utc};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Emissao {
        numero: String,
        #[serde(with = "dates::iso")]
        data_emissao: DateTime<Utc>,
        #[serde(default, with = "dates::iso_option")]
        data_compensacao: Option<DateTime<Utc>>,
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips_typed_dates() {
        let store = Store::in_memory();
        let value = vec![Emissao {
            numero: "123".to_string(),
            data_emissao: Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
            data_compensacao: Some(Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()),
        }];

        assert!(store.save("cheques", &value).await);
        let loaded: Vec<Emissao> = store.load("cheques", Vec::new()).await;
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn test_load_revives_js_style_iso_strings() {
        let store = Store::in_memory();
        store
            .backend
            .set_raw(
                "cheques",
                r#"[{"numero":"7","dataEmissao":"2024-01-10T00:00:00.000Z","dataCompensacao":null}]"#,
            )
            .await
            .unwrap();

        let loaded: Vec<Emissao> = store.load("cheques", Vec::new()).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded[0].data_emissao,
            Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
        );
        assert!(loaded[0].data_compensacao.is_none());
    }

    #[tokio::test]
    async fn test_corrupted_value_is_backed_up_and_default_returned() {
        let store = Store::in_memory();
        store.backend.set_raw("fundosManeio", "{not json").await.unwrap();

        let loaded: Vec<Emissao> = store.load("fundosManeio", Vec::new()).await;
        assert!(loaded.is_empty());

        let backup = store.backend.get_raw("fundosManeio_backup").await.unwrap();
        assert_eq!(backup.as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_parse_reports_corruption_as_error() {
        let store = Store::in_memory();
        store.backend.set_raw("receitas", "[1,").await.unwrap();
        let parsed: Result<Option<Vec<Emissao>>> = store.parse("receitas").await;
        assert!(matches!(parsed, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn test_save_returns_false_when_backend_rejects_write() {
        let store = Store::new(Arc::new(MemoryBackend::read_only()), DEFAULT_DEBOUNCE);
        assert!(!store.save("receitas", &Vec::<u32>::new()).await);
    }

    #[tokio::test]
    async fn test_load_sees_pending_debounced_value() {
        let store = Store::new(Arc::new(MemoryBackend::new()), Duration::from_secs(60));
        assert!(store.schedule_save("orcamentos", &vec![1, 2]).await);

        let loaded: Vec<i32> = store.load("orcamentos", Vec::new()).await;
        assert_eq!(loaded, vec![1, 2]);

        assert_eq!(store.flush().await, 1);
        assert_eq!(
            store.backend.get_raw("orcamentos").await.unwrap().as_deref(),
            Some("[1,2]")
        );
    }

    #[tokio::test]
    async fn test_save_supersedes_pending_write() {
        let store = Store::new(Arc::new(MemoryBackend::new()), Duration::from_secs(60));
        assert!(store.schedule_save("receitas", &vec![1]).await);
        assert!(store.save("receitas", &vec![2]).await);

        let loaded: Vec<i32> = store.load("receitas", Vec::new()).await;
        assert_eq!(loaded, vec![2]);
        assert_eq!(store.flush().await, 0);
    }

    #[tokio::test]
    async fn test_clear_keeps_backup() {
        let store = Store::in_memory();
        assert!(store.save("fundosManeio", &vec![1]).await);
        assert!(store.clear("fundosManeio").await);

        assert!(store.backend.get_raw("fundosManeio").await.unwrap().is_none());
        assert_eq!(
            store.backend.get_raw("fundosManeio_backup").await.unwrap().as_deref(),
            Some("[1]")
        );
    }
}
