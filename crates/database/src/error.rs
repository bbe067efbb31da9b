//! Database error types.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Missing or invalid required input
    #[error("invalid input: {0}")]
    Validation(String),

    /// Status change not permitted by the task state machine
    #[error("cannot move task from '{from}' to '{to}'")]
    InvalidTransition { from: &'static str, to: &'static str },
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
