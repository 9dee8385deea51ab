//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and shutdown.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: colony_core::ConfigError,
    },

    /// Cycle clock initialization failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: colony_core::ClockError,
    },

    /// Connecting to or migrating `PostgreSQL`, or connecting to Dragonfly, failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying data layer error.
        #[from]
        source: colony_db::DbError,
    },

    /// A ledger store call failed during startup.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: colony_ledger::StoreError,
    },

    /// A configured value cannot be represented at runtime.
    #[error("invalid setting: {message}")]
    Setting {
        /// What is wrong.
        message: String,
    },
}
