//! Entity module - Contains the SeaORM entity definitions for the local store.
//! The local store is a single key-value table; domain records live inside its
//! JSON documents (see `crate::models`).

pub mod storage_entry;

pub use storage_entry::{
    Column as StorageEntryColumn, Entity as StorageEntry, Model as StorageEntryModel,
};
