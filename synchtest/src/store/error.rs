//! Store error types.

use thiserror::Error;

/// Errors reported by a store driver.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The server rejected or failed a statement.
    #[error("query failed: {0}")]
    Query(String),

    /// A column value could not be decoded.
    #[error("cannot decode column '{column}': {reason}")]
    Decode {
        /// Column name.
        column: String,
        /// What was wrong with the value.
        reason: String,
    },

    /// The session was already closed.
    #[error("session closed")]
    Closed,

    /// Error from the PostgreSQL driver.
    #[error("postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}
