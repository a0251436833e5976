//! Incident operations (creation, atomic update, admission, recovery)

use crate::error::{DbError, Result};
use crate::lock::{LockKey, RowLockGuard};
use crate::types::*;
use crate::IncidentDb;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info, warn};

impl IncidentDb {
    // ========================================================================
    // Creation and lookup
    // ========================================================================

    /// Insert a new incident at `Stage::Initial`.
    ///
    /// Fails with `DbError::DuplicateLink` when the link direction already has
    /// a record; the existing record is left untouched.
    pub async fn create_incident(&self, new: &NewIncident) -> Result<Incident> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM incidents WHERE hostname = ? AND interface = ?")
                .bind(&new.hostname)
                .bind(&new.interface)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            tx.rollback().await?;
            return Err(DbError::DuplicateLink {
                hostname: new.hostname.clone(),
                interface: new.interface.clone(),
            });
        }

        let now = Self::now_millis();
        let inserted = sqlx::query(
            r#"
            INSERT INTO incidents (
                event_id, hostname, interface, link_type, peer,
                status_h, status_p, role_h, role_p, model_h, model_p,
                classname, metric_type, metric_value, assigned_to, created_at,
                priority, stage, permit, running, version, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?)
            "#,
        )
        .bind(&new.event_id)
        .bind(&new.hostname)
        .bind(&new.interface)
        .bind(&new.link_type)
        .bind(&new.peer)
        .bind(&new.status_h)
        .bind(&new.status_p)
        .bind(&new.role_h)
        .bind(&new.role_p)
        .bind(&new.model_h)
        .bind(&new.model_p)
        .bind(new.classname.as_str())
        .bind(&new.metric_type)
        .bind(new.metric_value)
        .bind(UNASSIGNED)
        .bind(new.created_at.timestamp_millis())
        .bind(DEFAULT_PRIORITY)
        .bind(Stage::Initial.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(err) if DbError::is_unique_violation(&err) => {
                tx.rollback().await?;
                return Err(unique_violation_to_error(new, &err));
            }
            Err(err) => return Err(err.into()),
        };

        tx.commit().await?;

        info!(
            incident_id = id,
            hostname = %new.hostname,
            interface = %new.interface,
            classname = %new.classname,
            "Incident created"
        );

        self.get_incident(id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("Incident {} vanished after insert", id)))
    }

    /// Get an incident by ID
    pub async fn get_incident(&self, id: i64) -> Result<Option<Incident>> {
        let row = sqlx::query("SELECT * FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_incident(&row)).transpose()
    }

    /// Find the incident for one link direction
    pub async fn find_incident(&self, hostname: &str, interface: &str) -> Result<Option<Incident>> {
        let row = sqlx::query("SELECT * FROM incidents WHERE hostname = ? AND interface = ?")
            .bind(hostname)
            .bind(interface)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_incident(&row)).transpose()
    }

    /// List incidents matching a filter, oldest first
    pub async fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM incidents WHERE 1=1");

        if let Some(stage) = filter.stage {
            qb.push(" AND stage = ").push_bind(stage.as_str());
        }
        if let Some(permit) = filter.permit {
            qb.push(" AND permit = ").push_bind(permit);
        }
        if let Some(running) = filter.running {
            qb.push(" AND running = ").push_bind(running);
        }
        if let Some(ref hostname) = filter.hostname {
            qb.push(" AND hostname = ").push_bind(hostname.clone());
        }

        qb.push(" ORDER BY created_at ASC, id ASC");

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_incident).collect()
    }

    /// Incidents eligible to start a pipeline run:
    /// `stage = initial AND permit = false AND running = false`.
    pub async fn select_pending(&self) -> Result<Vec<Incident>> {
        self.list_incidents(&IncidentFilter::pending()).await
    }

    // ========================================================================
    // Concurrency control
    // ========================================================================

    /// Claim exclusive, in-process ownership of one incident row.
    ///
    /// Never blocks: a row already claimed yields `DbError::Contention`.
    pub fn try_lock_incident(&self, incident_id: i64) -> Result<RowLockGuard> {
        self.locks
            .try_acquire(incident_id, vec![LockKey::Incident(incident_id)])
    }

    /// Claim the host and the unordered link pair of `incident`.
    ///
    /// Runs holding overlapping scopes would read each other's siblings in
    /// their policy checks; the second claimant gets `DbError::Contention`.
    pub fn try_lock_scope(&self, incident: &Incident) -> Result<RowLockGuard> {
        self.locks.try_acquire(
            incident.id,
            LockKey::scope(&incident.hostname, &incident.peer).to_vec(),
        )
    }

    /// True while some pipeline run in this process holds the row.
    pub fn is_locked(&self, incident_id: i64) -> bool {
        self.locks.is_held(&LockKey::Incident(incident_id))
    }

    /// Persist every mutable field of `incident`, compare-and-swap on `version`.
    ///
    /// Exactly one of several writers holding the same version succeeds; the
    /// others get `DbError::Contention` and the row keeps the winner's values.
    /// On success `incident.version` and `incident.updated_at` are refreshed.
    pub async fn update_atomic(&self, incident: &mut Incident) -> Result<()> {
        let now = Self::now_millis();
        let rows_affected = sqlx::query(
            r#"
            UPDATE incidents SET
                link_type = ?,
                peer = ?,
                status_h = ?,
                status_p = ?,
                role_h = ?,
                role_p = ?,
                model_h = ?,
                model_p = ?,
                classname = ?,
                metric_type = ?,
                metric_value = ?,
                assigned_to = ?,
                priority = ?,
                stage = ?,
                permit = ?,
                running = ?,
                ticket_id = ?,
                version = version + 1,
                updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&incident.link_type)
        .bind(&incident.peer)
        .bind(&incident.status_h)
        .bind(&incident.status_p)
        .bind(&incident.role_h)
        .bind(&incident.role_p)
        .bind(&incident.model_h)
        .bind(&incident.model_p)
        .bind(incident.classname.as_str())
        .bind(&incident.metric_type)
        .bind(incident.metric_value)
        .bind(&incident.assigned_to)
        .bind(&incident.priority)
        .bind(incident.stage.as_str())
        .bind(incident.permit)
        .bind(incident.running)
        .bind(&incident.ticket_id)
        .bind(now)
        .bind(incident.id)
        .bind(incident.version)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM incidents WHERE id = ?")
                .bind(incident.id)
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => {
                    warn!(incident_id = incident.id, version = incident.version, "Stale incident write rejected");
                    Err(DbError::Contention {
                        incident_id: incident.id,
                    })
                }
                None => Err(DbError::not_found(format!("Incident {}", incident.id))),
            };
        }

        incident.version += 1;
        incident.updated_at = Self::millis_to_datetime(now);
        debug!(
            incident_id = incident.id,
            stage = %incident.stage,
            permit = incident.permit,
            running = incident.running,
            "Incident updated"
        );
        Ok(())
    }

    // ========================================================================
    // Policy queries
    // ========================================================================

    /// The opposite direction of a link that has already entered remediation.
    pub async fn find_reverse_link(&self, hostname: &str, peer: &str) -> Result<Option<Incident>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM incidents
            WHERE hostname = ? AND peer = ? AND stage NOT IN ('initial', 'classification')
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(peer)
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row_to_incident(&row)).transpose()
    }

    /// Number of permitted shutdowns already issued (or about to be) on a host.
    pub async fn count_permitted_shutdowns(&self, hostname: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM incidents
            WHERE hostname = ? AND permit = 1 AND stage IN ('port_shutdown', 'jira_create')
            "#,
        )
        .bind(hostname)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Operator reset: put one incident back on the admission path.
    ///
    /// Terminal incidents stay as they are for audit.
    pub async fn reset_incident(&self, incident_id: i64) -> Result<Incident> {
        let _guard = self.try_lock_incident(incident_id)?;

        let mut incident = self
            .get_incident(incident_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("Incident {}", incident_id)))?;

        if incident.stage.is_terminal() {
            return Err(DbError::invalid_state(format!(
                "Incident {} is at terminal stage {}",
                incident_id, incident.stage
            )));
        }

        incident.stage = Stage::Initial;
        incident.permit = false;
        incident.running = false;
        self.update_atomic(&mut incident).await?;

        info!(incident_id, "Incident reset to initial");
        Ok(incident)
    }

    /// Release in-flight incidents whose last write is older than `older_than`.
    ///
    /// Rows held by a live run in this process and rows that changed since
    /// they were read are skipped. Returns the number of released incidents.
    pub async fn release_stale(&self, older_than: chrono::Duration) -> Result<u64> {
        let threshold = Self::now_millis() - older_than.num_milliseconds();

        let rows = sqlx::query(
            r#"
            SELECT id, version FROM incidents
            WHERE running = 1
              AND stage != 'jira_create'
              AND classname != 'unclassified'
              AND updated_at < ?
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        let mut released = 0u64;
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let version: i64 = row.try_get("version")?;
            if self.is_locked(id) {
                continue;
            }

            let rows_affected = sqlx::query(
                r#"
                UPDATE incidents SET
                    stage = 'initial',
                    permit = 0,
                    running = 0,
                    version = version + 1,
                    updated_at = ?
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(Self::now_millis())
            .bind(id)
            .bind(version)
            .execute(&self.pool)
            .await?
            .rows_affected();

            if rows_affected > 0 {
                info!(incident_id = id, "Released stranded in-flight incident");
                released += 1;
            }
        }

        Ok(released)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Incident counts per stage
    pub async fn stage_counts(&self) -> Result<StageCounts> {
        let rows = sqlx::query(
            r#"
            SELECT stage, COUNT(*) AS total, COALESCE(SUM(running), 0) AS running
            FROM incidents
            GROUP BY stage
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StageCounts {
            by_stage: Stage::ALL.iter().map(|stage| (*stage, 0)).collect(),
            ..StageCounts::default()
        };

        for row in rows {
            let stage_str: String = row.try_get("stage")?;
            let stage = Stage::parse(&stage_str)
                .ok_or_else(|| DbError::invalid_state(format!("Unknown stage: {}", stage_str)))?;
            let total = row.try_get::<i64, _>("total")?.max(0) as u64;
            let running = row.try_get::<i64, _>("running")?.max(0) as u64;

            counts.total += total;
            counts.running += running;
            if let Some(slot) = counts.by_stage.iter_mut().find(|(s, _)| *s == stage) {
                slot.1 = total;
            }
        }

        Ok(counts)
    }
}

fn unique_violation_to_error(new: &NewIncident, err: &sqlx::Error) -> DbError {
    if err.to_string().contains("incidents.event_id") {
        DbError::constraint(format!("Event {} already promoted", new.event_id))
    } else {
        DbError::DuplicateLink {
            hostname: new.hostname.clone(),
            interface: new.interface.clone(),
        }
    }
}

fn row_to_incident(row: &sqlx::sqlite::SqliteRow) -> Result<Incident> {
    let stage_str: String = row.try_get("stage")?;
    let stage = Stage::parse(&stage_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown stage: {}", stage_str)))?;

    let class_str: String = row.try_get("classname")?;
    let classname = LinkClass::parse(&class_str)
        .ok_or_else(|| DbError::invalid_state(format!("Unknown classname: {}", class_str)))?;

    Ok(Incident {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        hostname: row.try_get("hostname")?,
        interface: row.try_get("interface")?,
        link_type: row.try_get("link_type")?,
        peer: row.try_get("peer")?,
        status_h: row.try_get("status_h")?,
        status_p: row.try_get("status_p")?,
        role_h: row.try_get("role_h")?,
        role_p: row.try_get("role_p")?,
        model_h: row.try_get("model_h")?,
        model_p: row.try_get("model_p")?,
        classname,
        metric_type: row.try_get("metric_type")?,
        metric_value: row.try_get("metric_value")?,
        assigned_to: row.try_get("assigned_to")?,
        created_at: IncidentDb::millis_to_datetime(row.try_get("created_at")?),
        priority: row.try_get("priority")?,
        stage,
        permit: row.try_get("permit")?,
        running: row.try_get("running")?,
        ticket_id: row.try_get("ticket_id")?,
        version: row.try_get("version")?,
        updated_at: IncidentDb::millis_to_datetime(row.try_get("updated_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, IncidentDb) {
        let tmp = TempDir::new().unwrap();
        let db = IncidentDb::open(tmp.path().join("incidents.db")).await.unwrap();
        (tmp, db)
    }

    fn new_incident(hostname: &str, interface: &str, event_id: &str) -> NewIncident {
        NewIncident {
            event_id: event_id.to_string(),
            hostname: hostname.to_string(),
            interface: interface.to_string(),
            link_type: "P".to_string(),
            peer: "peerB".to_string(),
            status_h: PRODUCTION_STATUS.to_string(),
            status_p: String::new(),
            role_h: "core".to_string(),
            role_p: String::new(),
            model_h: "MX480".to_string(),
            model_p: None,
            classname: LinkClass::PeerUplink,
            metric_type: "InErrors".to_string(),
            metric_value: 250,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_starts_at_initial() {
        let (_tmp, db) = setup_test_db().await;

        let incident = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        assert_eq!(incident.stage, Stage::Initial);
        assert!(!incident.permit);
        assert!(!incident.running);
        assert_eq!(incident.priority, DEFAULT_PRIORITY);
        assert_eq!(incident.assigned_to, UNASSIGNED);
        assert_eq!(incident.version, 0);
        assert_eq!(incident.classname, LinkClass::PeerUplink);
    }

    #[tokio::test]
    async fn test_duplicate_link_rejected_and_original_preserved() {
        let (_tmp, db) = setup_test_db().await;

        let original = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();

        let mut second = new_incident("switchA", "xe-0/0/1", "ev-2");
        second.metric_value = 9999;
        let err = db.create_incident(&second).await.unwrap_err();
        assert!(matches!(err, DbError::DuplicateLink { .. }), "got {err:?}");

        let stored = db.find_incident("switchA", "xe-0/0/1").await.unwrap().unwrap();
        assert_eq!(stored, original);
    }

    #[tokio::test]
    async fn test_duplicate_event_id_is_constraint_error() {
        let (_tmp, db) = setup_test_db().await;

        db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        let err = db
            .create_incident(&new_incident("switchA", "xe-0/0/2", "ev-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_concurrent_updates_only_one_wins() {
        let (_tmp, db) = setup_test_db().await;
        let created = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();

        let mut writer_a = created.clone();
        let mut writer_b = created.clone();
        writer_a.stage = Stage::Classification;
        writer_a.running = true;
        writer_b.stage = Stage::ExistenceCheck;

        let other_writer = db.clone();
        let (a, b) = tokio::join!(
            db.update_atomic(&mut writer_a),
            other_writer.update_atomic(&mut writer_b)
        );
        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

        let loser = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
        assert!(loser.is_contention());

        let stored = db.get_incident(created.id).await.unwrap().unwrap();
        let winner = if outcomes[0] { &writer_a } else { &writer_b };
        assert_eq!(stored.stage, winner.stage);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_incident_is_not_found() {
        let (_tmp, db) = setup_test_db().await;
        let mut incident = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        incident.id = 4242;

        let err = db.update_atomic(&mut incident).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_select_pending_excludes_running() {
        let (_tmp, db) = setup_test_db().await;
        let mut first = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        db.create_incident(&new_incident("switchA", "xe-0/0/2", "ev-2")).await.unwrap();

        assert_eq!(db.select_pending().await.unwrap().len(), 2);

        first.stage = Stage::Classification;
        first.running = true;
        db.update_atomic(&mut first).await.unwrap();

        let pending = db.select_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending.iter().all(|i| !i.running && i.stage == Stage::Initial && !i.permit));
        assert_eq!(pending[0].interface, "xe-0/0/2");
    }

    #[tokio::test]
    async fn test_policy_queries() {
        let (_tmp, db) = setup_test_db().await;

        let mut forward = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        let mut reverse_new = new_incident("peerB", "et-1/0/0", "ev-2");
        reverse_new.peer = "switchA".to_string();
        db.create_incident(&reverse_new).await.unwrap();

        // Reverse direction is only "in remediation" once past classification
        assert!(db.find_reverse_link("peerB", "switchA").await.unwrap().is_none());

        forward.stage = Stage::PortShutdown;
        forward.permit = true;
        forward.running = true;
        db.update_atomic(&mut forward).await.unwrap();

        let reverse = db.find_reverse_link("peerB", "switchA").await.unwrap().unwrap();
        assert_eq!(reverse.id, forward.id);
        assert_eq!(db.count_permitted_shutdowns("switchA").await.unwrap(), 1);
        assert_eq!(db.count_permitted_shutdowns("peerB").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_incident() {
        let (_tmp, db) = setup_test_db().await;
        let mut incident = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        incident.stage = Stage::BandwidthCheck;
        incident.running = true;
        incident.permit = true;
        db.update_atomic(&mut incident).await.unwrap();

        // A live run blocks the reset without waiting
        {
            let _guard = db.try_lock_incident(incident.id).unwrap();
            assert!(db.reset_incident(incident.id).await.unwrap_err().is_contention());
        }

        let reset = db.reset_incident(incident.id).await.unwrap();
        assert_eq!(reset.stage, Stage::Initial);
        assert!(!reset.running && !reset.permit);
        assert_eq!(db.select_pending().await.unwrap().len(), 1);

        let mut terminal = reset.clone();
        terminal.stage = Stage::JiraCreate;
        db.update_atomic(&mut terminal).await.unwrap();
        assert!(matches!(
            db.reset_incident(incident.id).await.unwrap_err(),
            DbError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn test_release_stale_only_touches_old_inflight_rows() {
        let (_tmp, db) = setup_test_db().await;

        let mut stranded = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        stranded.stage = Stage::ExistenceCheck;
        stranded.running = true;
        db.update_atomic(&mut stranded).await.unwrap();

        let mut unclassified = db.create_incident(&new_incident("switchA", "xe-0/0/2", "ev-2")).await.unwrap();
        unclassified.classname = LinkClass::Unclassified;
        unclassified.stage = Stage::Classification;
        unclassified.running = true;
        db.update_atomic(&mut unclassified).await.unwrap();

        // Nothing is older than an hour yet
        assert_eq!(db.release_stale(chrono::Duration::hours(1)).await.unwrap(), 0);

        // Age every row by an hour
        sqlx::query("UPDATE incidents SET updated_at = updated_at - 3600000")
            .execute(db.pool())
            .await
            .unwrap();

        // A row held by a live run is left alone
        {
            let _guard = db.try_lock_incident(stranded.id).unwrap();
            assert_eq!(db.release_stale(chrono::Duration::minutes(30)).await.unwrap(), 0);
        }

        assert_eq!(db.release_stale(chrono::Duration::minutes(30)).await.unwrap(), 1);
        let released = db.get_incident(stranded.id).await.unwrap().unwrap();
        assert_eq!(released.stage, Stage::Initial);
        assert!(!released.running);

        let still_parked = db.get_incident(unclassified.id).await.unwrap().unwrap();
        assert!(still_parked.running);
    }

    #[tokio::test]
    async fn test_stage_counts() {
        let (_tmp, db) = setup_test_db().await;
        let mut a = db.create_incident(&new_incident("switchA", "xe-0/0/1", "ev-1")).await.unwrap();
        db.create_incident(&new_incident("switchA", "xe-0/0/2", "ev-2")).await.unwrap();
        a.stage = Stage::Classification;
        a.running = true;
        db.update_atomic(&mut a).await.unwrap();

        let counts = db.stage_counts().await.unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.by_stage.len(), Stage::ALL.len());
        assert!(counts.by_stage.contains(&(Stage::Initial, 1)));
        assert!(counts.by_stage.contains(&(Stage::Classification, 1)));
        assert!(counts.by_stage.contains(&(Stage::JiraCreate, 0)));
    }
}
