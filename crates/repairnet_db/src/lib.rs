//! Incident store for RepairNet
//!
//! This crate owns every durable record the remediation pipeline touches:
//! incidents, the topology snapshot, and events that could not be matched
//! to a known host.
//!
//! # Usage
//!
//! ```rust,ignore
//! use repairnet_db::{IncidentDb, Result};
//!
//! let db = IncidentDb::open("~/.repairnet/repairnet.sqlite3").await?;
//!
//! let pending = db.select_pending().await?;
//! let _guard = db.try_lock_incident(pending[0].id)?;
//! ```

mod error;
mod lock;
mod schema;
mod types;

// Method implementations organized by domain
mod incidents;
mod topology;

pub use error::{DbError, Result};
pub use lock::{LockKey, RowLockGuard};
pub use types::*;

use lock::RowLocks;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Durable store for incidents and the topology snapshot.
///
/// Clones share the connection pool and the in-process row locks.
#[derive(Clone)]
pub struct IncidentDb {
    pool: SqlitePool,
    locks: RowLocks,
}

impl IncidentDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self {
            pool,
            locks: RowLocks::default(),
        };

        db.ensure_schema().await?;

        info!(path = %path.display(), "Incident store opened");

        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl IncidentDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}
