//! Error taxonomy, per SPEC_FULL.md §7.
//!
//! Mirrors the reference client's `BackendError`: a small `thiserror` enum distinguishing
//! what a caller does next, rather than one catch-all `anyhow::Error`.

/// Errors that can surface from the validation engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required configuration value was missing or invalid at start-up. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// A database error that a worker should treat as transient and retry after a sleep.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The Chat Adapter failed (network error, non-2xx, or unparsable body).
    #[error("chat adapter error: {0}")]
    Chat(String),

    /// The Search Adapter failed (network error, non-2xx, or unparsable body).
    #[error("search adapter error: {0}")]
    Search(String),
}

impl Error {
    /// `true` for errors a worker should sleep-and-retry rather than treat as an `Invalid` row.
    #[must_use]
    pub fn is_transient_db(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

/// Result alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, Error>;
