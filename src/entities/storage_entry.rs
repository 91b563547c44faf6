//! Storage entry entity - the local key-value store.
//! Each row holds one persisted collection (e.g. `"fornecedores"`) as a JSON
//! document, mirroring what the browser kept in local storage.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Key-value row holding a serialized JSON document
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_entries")]
pub struct Model {
    /// Storage key (e.g. `"cheques"`, `"fundosManeio_backup"`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    /// Raw JSON document
    #[sea_orm(column_type = "Text")]
    pub value: String,
    /// When this key was last written
    pub updated_at: DateTimeUtc,
}

/// Storage entries have no relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
