//! Error types for the store subsystem.
//!
//! [`StoreError`] is the primary error type returned by all store operations.
//! Variants are specific enough for exhaustive matching at the service layer
//! while keeping the surface small.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed. Fatal: the application must not proceed
    /// with a partially migrated schema.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested provider was not found.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Requested column was not found.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Requested message was not found.
    #[error("message not found: {0}")]
    MessageNotFound(String),

    /// Requested history entry was not found.
    #[error("history entry not found: {0}")]
    HistoryNotFound(String),

    /// Malformed input rejected before any I/O.
    #[error("validation error: {0}")]
    Validation(String),

    /// Internal error (e.g. poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
