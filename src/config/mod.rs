/// Database connections and table creation
pub mod database;

/// Application settings from the environment and config.toml
pub mod settings;

/// Default user accounts seeded on first run
pub mod users;

pub use settings::{AppConfig, Settings, StorageSettings};
