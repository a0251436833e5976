//! Error types for the incident store.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// An incident for this link direction already exists
    #[error("Incident already exists for {hostname} {interface}")]
    DuplicateLink { hostname: String, interface: String },

    /// Another writer holds or has already changed the record
    #[error("Incident {incident_id} is locked or was modified by another writer")]
    Contention { incident_id: i64 },

    /// Constraint violation (unique, foreign key, etc.)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Invalid state transition or unreadable persisted value
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a constraint error.
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// True when the caller lost a race for the record and should retry on a later pass.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}
