//! Topology snapshot and unmatched-event operations

use crate::error::{DbError, Result};
use crate::types::*;
use crate::IncidentDb;
use sqlx::Row;
use tracing::info;

impl IncidentDb {
    // ========================================================================
    // Topology snapshot
    // ========================================================================

    /// Replace the whole topology snapshot in one transaction.
    ///
    /// Readers see either the previous snapshot or the new one, never a mix.
    pub async fn replace_topology(&self, hosts: &[TopologyHost]) -> Result<usize> {
        let now = Self::now_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM topology_hosts")
            .execute(&mut *tx)
            .await?;

        for host in hosts {
            if host.hostname.is_empty() {
                return Err(DbError::constraint("topology host without hostname"));
            }
            sqlx::query(
                r#"
                INSERT INTO topology_hosts (hostname, roles, hardware_model, status, imported_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(hostname) DO UPDATE SET
                    roles = excluded.roles,
                    hardware_model = excluded.hardware_model,
                    status = excluded.status,
                    imported_at = excluded.imported_at
                "#,
            )
            .bind(&host.hostname)
            .bind(&host.roles)
            .bind(&host.hardware_model)
            .bind(&host.status)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(hosts = hosts.len(), "Topology snapshot replaced");
        Ok(hosts.len())
    }

    /// Get one host from the snapshot
    pub async fn get_host(&self, hostname: &str) -> Result<Option<TopologyHost>> {
        let row = sqlx::query("SELECT * FROM topology_hosts WHERE hostname = ?")
            .bind(hostname)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_host(&row)).transpose()
    }

    /// List the whole snapshot, ordered by hostname
    pub async fn list_hosts(&self) -> Result<Vec<TopologyHost>> {
        let rows = sqlx::query("SELECT * FROM topology_hosts ORDER BY hostname")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_host).collect()
    }

    // ========================================================================
    // Unmatched events
    // ========================================================================

    /// Remember an event whose host is not in the snapshot.
    ///
    /// Returns false when the link direction is already recorded.
    pub async fn record_unmatched_event(&self, event: &UnmatchedEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO unmatched_events (hostname, interface, description, link_type, peer, value, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(hostname, interface) DO NOTHING
            "#,
        )
        .bind(&event.hostname)
        .bind(&event.interface)
        .bind(&event.description)
        .bind(&event.link_type)
        .bind(&event.peer)
        .bind(event.value)
        .bind(event.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List unmatched events, newest first
    pub async fn list_unmatched_events(&self) -> Result<Vec<UnmatchedEvent>> {
        let rows = sqlx::query("SELECT * FROM unmatched_events ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(UnmatchedEvent {
                    hostname: row.try_get("hostname")?,
                    interface: row.try_get("interface")?,
                    description: row.try_get("description")?,
                    link_type: row.try_get("link_type")?,
                    peer: row.try_get("peer")?,
                    value: row.try_get("value")?,
                    created_at: Self::millis_to_datetime(row.try_get("created_at")?),
                })
            })
            .collect()
    }
}

fn row_to_host(row: &sqlx::sqlite::SqliteRow) -> Result<TopologyHost> {
    Ok(TopologyHost {
        hostname: row.try_get("hostname")?,
        roles: row.try_get("roles")?,
        hardware_model: row.try_get("hardware_model")?,
        status: row.try_get("status")?,
    })
}
