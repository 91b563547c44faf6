//! Database configuration for the local store and the optional remote mirror.
//!
//! The local store is a single `storage_entries` table created from its
//! `SeaORM` entity definition. The remote mirror is reached through its own
//! connection; failing to reach it is logged and the application continues in
//! local-only mode.

use crate::entities::StorageEntry;
use crate::errors::Result;
use crate::storage::{RemoteStore, SeaOrmRemote};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/tesouraria.sqlite?mode=rwc";

/// Gets the local database URL from `DATABASE_URL`, or the default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Connects to the local store database.
///
/// # Errors
/// Returns `Error::Database` if the connection cannot be established.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(dir) = sqlite_parent_dir(database_url) {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("Could not create database directory {}: {}", dir, e);
        }
    }
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates the local store tables if they are missing.
///
/// # Errors
/// Returns `Error::Database` if a statement fails.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut storage_table = schema.create_table_from_entity(StorageEntry);
    storage_table.if_not_exists();
    db.execute(builder.build(&storage_table)).await?;

    Ok(())
}

/// Connects to the remote mirror if `url` is set. Any failure yields `None`.
pub async fn connect_remote(url: Option<&str>) -> Option<Arc<dyn RemoteStore>> {
    let Some(url) = url else {
        info!("No remote database configured, running in local-only mode");
        return None;
    };

    match SeaOrmRemote::connect(url).await {
        Ok(remote) => Some(Arc::new(remote)),
        Err(e) => {
            warn!("Remote database unavailable, running in local-only mode: {}", e);
            None
        }
    }
}

/// Directory part of a file-backed `SQLite` URL.
fn sqlite_parent_dir(database_url: &str) -> Option<String> {
    let path = database_url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    let (dir, _) = path.rsplit_once('/')?;
    (!dir.is_empty()).then(|| dir.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StorageEntryModel;
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<StorageEntryModel> = StorageEntry::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_remote_means_local_only() {
        assert!(connect_remote(None).await.is_none());
    }

    #[test]
    fn test_sqlite_parent_dir() {
        assert_eq!(
            sqlite_parent_dir("sqlite://data/tesouraria.sqlite?mode=rwc").as_deref(),
            Some("data")
        );
        assert_eq!(sqlite_parent_dir("sqlite::memory:"), None);
        assert_eq!(sqlite_parent_dir("postgres://host/db"), None);
    }
}
