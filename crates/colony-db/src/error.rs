//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] and [`fred`] errors. The settlement engine only sees
//! [`StoreError`]; the conversion below classifies each failure as
//! transient or permanent.

use colony_ledger::StoreError;

/// `PostgreSQL` error codes for a lost serialization or deadlock race.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// Unique constraint violation: a racing writer committed the same cycle.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key was not found in `Dragonfly`.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A stored row does not decode into the data model.
    #[error("Corrupt row {id}: {reason}")]
    Corrupt {
        /// Identifier of the offending row.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Shorthand for a [`DbError::Corrupt`].
    pub(crate) fn corrupt(id: impl ToString, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Postgres(e) => classify_sqlx(&e),
            DbError::Serialization(e) => Self::Serialization(e.to_string()),
            DbError::Corrupt { id, reason } => Self::Corrupt { id, reason },
            other => Self::Unavailable(other.to_string()),
        }
    }
}

fn classify_sqlx(err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            let code = code.as_deref().unwrap_or_default();
            if RETRYABLE_SQLSTATES.contains(&code) || code == UNIQUE_VIOLATION {
                StoreError::Conflict(err.to_string())
            } else {
                StoreError::Unavailable(err.to_string())
            }
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Serialization(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}
