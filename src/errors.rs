use thiserror::Error;

/// Unified error type for the treasury core.
///
/// The first five variants are the user-facing taxonomy: they abort the
/// operation that raised them and leave no partial state behind. The rest are
/// ambient failures from the storage and configuration layers.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or invalid.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The petty-cash ledger cannot cover a debit.
    #[error("Insufficient funds: balance {current:.2}, required {required:.2}")]
    InsufficientFunds { current: f64, required: f64 },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The store could not be read or written.
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// The acting user may not act on this workflow step.
    #[error("Not authorized: {message}")]
    Authorization { message: String },

    /// A workflow transition was attempted from a terminal or absent state.
    #[error("Invalid workflow state: {message}")]
    InvalidWorkflowState { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
