//! Optional remote mirror.
//!
//! Each mirrored table holds one JSON document per row, keyed by id. The
//! remote is a Postgres database in production; any backend sea-orm speaks
//! works, which is how the tests run it against in-memory `SQLite`.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use regex::Regex;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, Statement,
    sea_query::{Alias, ColumnDef, Expr, OnConflict, Query, Table},
};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, instrument, warn};

/// Tables mirrored remotely.
pub const REMOTE_TABLES: [&str; 3] = ["pagamentos", "cheques", "receitas"];

static UUID_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$").ok()
});

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Inserts or replaces the document `id` in `table`.
    async fn upsert(&self, table: &str, id: &str, payload: &Value) -> Result<()>;
    /// Every document in `table`.
    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>>;
    async fn delete(&self, table: &str, id: &str) -> Result<()>;
    /// Server-side UUID generation.
    async fn generate_uuid(&self) -> Result<String>;
    /// Server-side UUID validation.
    async fn is_valid_uuid(&self, id: &str) -> Result<bool>;
}

/// [`RemoteStore`] over a sea-orm connection.
#[derive(Debug, Clone)]
pub struct SeaOrmRemote {
    db: DatabaseConnection,
}

impl SeaOrmRemote {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connects to `url` and makes sure the mirrored tables exist.
    ///
    /// # Errors
    /// Returns `Error::Database` if the connection or table creation fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let db = Database::connect(url).await?;
        create_remote_tables(&db).await?;
        info!("Connected to remote mirror");
        Ok(Self { db })
    }
}

/// Creates the mirrored tables if they are missing.
///
/// # Errors
/// Returns `Error::Database` if a statement fails.
pub async fn create_remote_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    for table in REMOTE_TABLES {
        let stmt = Table::create()
            .table(Alias::new(table))
            .if_not_exists()
            .col(ColumnDef::new(Alias::new("id")).string().not_null().primary_key())
            .col(ColumnDef::new(Alias::new("payload")).text().not_null())
            .col(ColumnDef::new(Alias::new("updated_at")).string().not_null())
            .to_owned();
        db.execute(builder.build(&stmt)).await?;
    }
    Ok(())
}

#[async_trait]
impl RemoteStore for SeaOrmRemote {
    #[instrument(skip(self, payload))]
    async fn upsert(&self, table: &str, id: &str, payload: &Value) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();
        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(table))
            .columns([Alias::new("id"), Alias::new("payload"), Alias::new("updated_at")]);
        stmt.values([id.into(), payload.to_string().into(), updated_at.into()])
            .map_err(|e| Error::Persistence {
                message: format!("Failed to build upsert for '{table}': {e}"),
            })?;
        stmt.on_conflict(
            OnConflict::column(Alias::new("id"))
                .update_columns([Alias::new("payload"), Alias::new("updated_at")])
                .to_owned(),
        );

        let builder = self.db.get_database_backend();
        self.db.execute(builder.build(&stmt)).await?;
        debug!("Mirrored {}/{}", table, id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>> {
        let stmt = Query::select()
            .column(Alias::new("payload"))
            .from(Alias::new(table))
            .to_owned();
        let builder = self.db.get_database_backend();
        let rows = self.db.query_all(builder.build(&stmt)).await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.try_get("", "payload")?;
            documents.push(serde_json::from_str(&payload)?);
        }
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        let stmt = Query::delete()
            .from_table(Alias::new(table))
            .and_where(Expr::col(Alias::new("id")).eq(id))
            .to_owned();
        let builder = self.db.get_database_backend();
        self.db.execute(builder.build(&stmt)).await?;
        Ok(())
    }

    async fn generate_uuid(&self) -> Result<String> {
        let backend = self.db.get_database_backend();
        let row = self
            .db
            .query_one(Statement::from_string(
                backend,
                "SELECT gerar_uuid()::text AS uuid",
            ))
            .await?
            .ok_or_else(|| Error::Persistence {
                message: "gerar_uuid returned no row".to_string(),
            })?;
        Ok(row.try_get("", "uuid")?)
    }

    async fn is_valid_uuid(&self, id: &str) -> Result<bool> {
        let backend = self.db.get_database_backend();
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT is_valid_uuid($1) AS valid",
                [id.into()],
            ))
            .await?
            .ok_or_else(|| Error::Persistence {
                message: "is_valid_uuid returned no row".to_string(),
            })?;
        Ok(row.try_get("", "valid")?)
    }
}

/// A new UUID, from the remote when it answers, generated locally otherwise.
pub async fn gerar_uuid(remote: Option<&Arc<dyn RemoteStore>>) -> String {
    if let Some(remote) = remote {
        match remote.generate_uuid().await {
            Ok(id) => return id,
            Err(e) => warn!("Remote UUID generation failed, generating locally: {}", e),
        }
    }
    uuid::Uuid::new_v4().to_string()
}

/// Validates `id` remotely when possible, locally otherwise.
pub async fn validar_uuid(remote: Option<&Arc<dyn RemoteStore>>, id: &str) -> bool {
    if let Some(remote) = remote {
        match remote.is_valid_uuid(id).await {
            Ok(valid) => return valid,
            Err(e) => warn!("Remote UUID validation failed, validating locally: {}", e),
        }
    }
    is_valid_uuid_local(id)
}

#[must_use]
pub fn is_valid_uuid_local(id: &str) -> bool {
    UUID_PATTERN.as_ref().is_some_and(|re| re.is_match(id))
}
