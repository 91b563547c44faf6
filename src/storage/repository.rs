//! Generic remote-with-local-fallback repository.
//!
//! Every collection is one JSON array under its storage key. When a record
//! type names a remote table and a remote is configured, reads pull from the
//! remote first and merge into the local copy, and writes mirror the records
//! they touched. Remote failures are logged and never reach the caller.

use super::{
    RemoteStore, Store,
    remote::{gerar_uuid, is_valid_uuid_local, validar_uuid},
};
use crate::errors::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A persisted record type.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Local storage key holding the collection.
    const STORAGE_KEY: &'static str;
    /// Remote table mirroring the collection, if any.
    const REMOTE_TABLE: Option<&'static str> = None;
    /// Name used in `NotFound` errors.
    const ENTITY: &'static str;

    fn id(&self) -> &str;
}

pub struct Repository<T: Record> {
    store: Store,
    remote: Option<Arc<dyn RemoteStore>>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: self.remote.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("key", &T::STORAGE_KEY)
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

impl<T: Record> Repository<T> {
    #[must_use]
    pub const fn new(store: Store, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            store,
            remote,
            _record: PhantomData,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub const fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.remote.as_ref()
    }

    fn mirror_target(&self) -> Option<(&Arc<dyn RemoteStore>, &'static str)> {
        self.remote.as_ref().zip(T::REMOTE_TABLE)
    }

    /// The local collection, without consulting the remote.
    pub async fn load_local(&self) -> Vec<T> {
        self.store.load(T::STORAGE_KEY, Vec::new()).await
    }

    /// The collection, refreshed from the remote when one is available.
    pub async fn list(&self) -> Vec<T> {
        let mut items = self.load_local().await;

        if let Some((remote, table)) = self.mirror_target() {
            match pull::<T>(remote.as_ref(), table).await {
                Ok(remote_items) => {
                    merge_by_id(&mut items, remote_items);
                    self.store.save(T::STORAGE_KEY, &items).await;
                }
                Err(e) => warn!("Remote read of '{}' failed, using local data: {}", table, e),
            }
        }

        items
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.load_local().await.into_iter().find(|item| item.id() == id)
    }

    /// Like [`Self::get`], but a missing record is an error.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no record has this id.
    pub async fn require(&self, id: &str) -> Result<T> {
        self.get(id).await.ok_or_else(|| Error::not_found(T::ENTITY, id))
    }

    pub async fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.load_local().await.into_iter().find(|item| predicate(item))
    }

    /// Appends `item`.
    ///
    /// # Errors
    /// Returns `Error::Validation` if a record with the same id exists.
    pub async fn add(&self, item: T) -> Result<T> {
        self.mutate(move |items| {
            if items.iter().any(|existing| existing.id() == item.id()) {
                return Err(Error::validation(format!(
                    "{} '{}' already exists",
                    T::ENTITY,
                    item.id()
                )));
            }
            items.push(item.clone());
            Ok(item)
        })
        .await
    }

    /// Replaces the record with the same id.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no record has this id.
    pub async fn update(&self, item: T) -> Result<T> {
        self.mutate(move |items| {
            let slot = items
                .iter_mut()
                .find(|existing| existing.id() == item.id())
                .ok_or_else(|| Error::not_found(T::ENTITY, item.id()))?;
            *slot = item.clone();
            Ok(item)
        })
        .await
    }

    /// Removes and returns the record `id`.
    ///
    /// # Errors
    /// Returns `Error::NotFound` if no record has this id.
    pub async fn delete(&self, id: &str) -> Result<T> {
        self.mutate(|items| {
            let index = items
                .iter()
                .position(|existing| existing.id() == id)
                .ok_or_else(|| Error::not_found(T::ENTITY, id))?;
            Ok(items.remove(index))
        })
        .await
    }

    /// Overwrites the whole collection.
    pub async fn replace_all(&self, items: Vec<T>) -> Vec<T> {
        self.mutate(move |current| {
            *current = items;
            Ok(current.clone())
        })
        .await
        .unwrap_or_default()
    }

    /// Gives `id` a fresh UUID when a remote is configured and `id` is not a
    /// UUID the remote accepts. Returns whether the id changed.
    pub async fn ensure_remote_id(&self, id: &mut String) -> bool {
        let Some(remote) = self.remote.as_ref() else {
            return false;
        };
        if validar_uuid(Some(remote), id).await {
            return false;
        }
        let fresh = gerar_uuid(Some(remote)).await;
        debug!("Replacing {} id '{}' with '{}'", T::ENTITY, id, fresh);
        *id = fresh;
        true
    }

    /// Reloads the collection, applies `change`, then persists and mirrors
    /// the result. Nothing is written if `change` fails.
    ///
    /// # Errors
    /// Returns whatever `change` returns.
    pub async fn mutate<R>(&self, change: impl FnOnce(&mut Vec<T>) -> Result<R>) -> Result<R> {
        self.apply(change, false).await
    }

    /// Like [`Self::mutate`], but the local write goes through the store's
    /// debouncer. For changes that come in bursts, such as read flags and
    /// derived states.
    ///
    /// # Errors
    /// Returns whatever `change` returns.
    pub async fn mutate_debounced<R>(&self, change: impl FnOnce(&mut Vec<T>) -> Result<R>) -> Result<R> {
        self.apply(change, true).await
    }

    async fn apply<R>(&self, change: impl FnOnce(&mut Vec<T>) -> Result<R>, debounced: bool) -> Result<R> {
        let mut items = self.load_local().await;
        let before = if self.mirror_target().is_some() {
            snapshot(&items)
        } else {
            HashMap::new()
        };

        let outcome = change(&mut items)?;

        let saved = if debounced {
            self.store.schedule_save(T::STORAGE_KEY, &items).await
        } else {
            self.store.save(T::STORAGE_KEY, &items).await
        };
        if !saved {
            error!(
                "Local write of '{}' failed; change kept in memory only",
                T::STORAGE_KEY
            );
        }
        self.mirror(&before, &items).await;
        Ok(outcome)
    }

    async fn mirror(&self, before: &HashMap<String, Value>, after: &[T]) {
        let Some((remote, table)) = self.mirror_target() else {
            return;
        };

        let after = snapshot(after);
        for (id, payload) in &after {
            if before.get(id) == Some(payload) {
                continue;
            }
            if !is_valid_uuid_local(id) {
                warn!("Not mirroring {}/{}: remote rows are keyed by UUID", table, id);
                continue;
            }
            if let Err(e) = remote.upsert(table, id, payload).await {
                warn!("Failed to mirror {}/{}: {}", table, id, e);
            }
        }
        for id in before.keys().filter(|id| !after.contains_key(*id)) {
            if let Err(e) = remote.delete(table, id).await {
                warn!("Failed to delete mirrored {}/{}: {}", table, id, e);
            }
        }
    }
}

fn snapshot<T: Record>(items: &[T]) -> HashMap<String, Value> {
    items
        .iter()
        .filter_map(|item| match serde_json::to_value(item) {
            Ok(value) => Some((item.id().to_string(), value)),
            Err(e) => {
                error!("Failed to serialize {} '{}': {}", T::ENTITY, item.id(), e);
                None
            }
        })
        .collect()
}

async fn pull<T: Record>(remote: &dyn RemoteStore, table: &str) -> Result<Vec<T>> {
    let rows = remote.fetch_all(table).await?;
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<T>(row) {
            Ok(item) => items.push(item),
            Err(e) => warn!("Skipping malformed row in '{}': {}", table, e),
        }
    }
    debug!("Pulled {} rows from '{}'", items.len(), table);
    Ok(items)
}

/// Remote rows replace local rows with the same id; local-only rows are kept.
fn merge_by_id<T: Record>(local: &mut Vec<T>, remote: Vec<T>) {
    for item in remote {
        match local.iter_mut().find(|existing| existing.id() == item.id()) {
            Some(existing) => *existing = item,
            None => local.push(item),
        }
    }
}
