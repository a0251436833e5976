//! Database schema creation for all RepairNet tables.
//!
//! All CREATE TABLE statements live here - single source of truth.

use crate::error::Result;
use crate::IncidentDb;
use tracing::info;

impl IncidentDb {
    /// Ensure all tables exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // WAL lets pipeline writers and operator reads proceed side by side
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout=5000")
            .execute(&self.pool)
            .await?;

        self.create_topology_tables().await?;
        self.create_incident_tables().await?;

        info!("Database schema verified");
        Ok(())
    }

    /// Topology snapshot and events that did not match it
    async fn create_topology_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS topology_hosts (
                hostname TEXT PRIMARY KEY,
                roles TEXT NOT NULL,
                hardware_model TEXT NOT NULL,
                status TEXT NOT NULL,
                imported_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS unmatched_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hostname TEXT NOT NULL,
                interface TEXT NOT NULL,
                description TEXT NOT NULL,
                link_type TEXT NOT NULL,
                peer TEXT NOT NULL,
                value INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(hostname, interface)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Incidents: one row per link direction
    async fn create_incident_tables(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                hostname TEXT NOT NULL,
                interface TEXT NOT NULL,
                link_type TEXT NOT NULL,
                peer TEXT NOT NULL,
                status_h TEXT NOT NULL,
                status_p TEXT NOT NULL DEFAULT '',
                role_h TEXT NOT NULL,
                role_p TEXT NOT NULL DEFAULT '',
                model_h TEXT NOT NULL,
                model_p TEXT,
                classname TEXT NOT NULL,
                metric_type TEXT NOT NULL,
                metric_value INTEGER NOT NULL,
                assigned_to TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                priority TEXT NOT NULL DEFAULT 'Critical',
                stage TEXT NOT NULL DEFAULT 'initial',
                permit INTEGER NOT NULL DEFAULT 0,
                running INTEGER NOT NULL DEFAULT 0,
                ticket_id TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL,
                CONSTRAINT unique_hostname_interface UNIQUE(hostname, interface)
            )"#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_incidents_admission ON incidents(stage, permit, running)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_incidents_peer ON incidents(peer)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
