//! Remediation pipeline
//!
//! Drives one incident at a time through classification and then through the
//! chain registered for its label. The in-process row lock is held for the
//! whole run and every write is a version compare-and-swap, so a record is
//! never mutated by two runs at once. A scope lock on the host and the link
//! pair keeps the duplicate and shutdown-budget checks from interleaving.

pub mod registry;
pub mod stages;

pub use registry::{Chain, PipelineRegistry, STANDARD_STAGES};
pub use stages::{HaltReason, StageOutcome};

use crate::classifier::{classify, LinkFacts};
use crate::collaborators::RemediationTargets;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::metrics::METRICS;
use repairnet_db::{DbError, Incident, IncidentDb, Stage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything a stage handler may touch.
#[derive(Clone)]
pub struct StageContext {
    pub db: IncidentDb,
    pub targets: RemediationTargets,
    pub config: PipelineConfig,
    pub dashboard_url: Option<String>,
}

/// How a single pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Reached the last stage of its chain
    Completed {
        ticket_id: Option<String>,
        shut_down: bool,
    },
    /// Stopped by a stage; the incident stays at `at` for a later pass
    Halted {
        at: Stage,
        reason: HaltReason,
        shut_down: bool,
    },
    /// No rule matched; left at classification for manual triage
    Unclassified,
    /// Another writer owns the record; abandoned for this pass
    Contended,
    /// The record left the admission state before this run claimed it
    NotPending,
}

/// The remediation state machine bound to its store and collaborators.
#[derive(Clone)]
pub struct Pipeline {
    ctx: StageContext,
    registry: Arc<PipelineRegistry>,
}

impl Pipeline {
    pub fn new(
        db: IncidentDb,
        registry: PipelineRegistry,
        targets: RemediationTargets,
        config: PipelineConfig,
        dashboard_url: Option<String>,
    ) -> Self {
        Self {
            ctx: StageContext {
                db,
                targets,
                config,
                dashboard_url,
            },
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Run one admitted incident as far as its chain allows.
    ///
    /// Contention, from the row lock or from a lost version race, is an
    /// outcome rather than an error.
    pub async fn run_incident(&self, incident_id: i64) -> Result<RunOutcome, PipelineError> {
        let _guard = match self.ctx.db.try_lock_incident(incident_id) {
            Ok(guard) => guard,
            Err(e) if e.is_contention() => {
                METRICS.inc_contention();
                debug!(incident_id, "Incident claimed by another run");
                return Ok(RunOutcome::Contended);
            }
            Err(e) => return Err(e.into()),
        };

        match self.run_locked(incident_id).await {
            Err(e) if e.is_contention() => {
                METRICS.inc_contention();
                warn!(incident_id, "Incident changed underneath the run; abandoned for this pass");
                Ok(RunOutcome::Contended)
            }
            other => other,
        }
    }

    async fn run_locked(&self, incident_id: i64) -> Result<RunOutcome, PipelineError> {
        let mut incident = self
            .ctx
            .db
            .get_incident(incident_id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("Incident {}", incident_id)))?;

        if incident.stage != Stage::Initial || incident.permit || incident.running {
            debug!(incident_id, stage = %incident.stage, "Incident no longer pending");
            return Ok(RunOutcome::NotPending);
        }

        // Sibling runs on the same host or link would race the policy checks
        let _scope = self.ctx.db.try_lock_scope(&incident)?;

        self.classify_stage(&mut incident).await?;
        if !incident.classname.is_classified() {
            info!(
                incident_id,
                hostname = %incident.hostname,
                interface = %incident.interface,
                "Incident unclassified; left for manual triage"
            );
            return Ok(RunOutcome::Unclassified);
        }

        let Some(chain) = self.registry.chain(incident.classname) else {
            warn!(incident_id, classname = %incident.classname, "No chain registered for label");
            return Ok(RunOutcome::Unclassified);
        };

        self.walk_chain(chain, &mut incident).await
    }

    /// First durable write of a run: label, resolved roles and `running = true`.
    async fn classify_stage(&self, incident: &mut Incident) -> Result<(), PipelineError> {
        let result = classify(&LinkFacts {
            link_type: &incident.link_type,
            hostname: &incident.hostname,
            peer: &incident.peer,
            role_h: &incident.role_h,
            role_p: &incident.role_p,
        });

        incident.classname = result.classname;
        incident.role_h = result.role_h;
        incident.role_p = result.role_p;
        incident.stage = Stage::Classification;
        incident.running = true;
        self.ctx.db.update_atomic(incident).await?;

        METRICS.inc_stages_advanced();
        info!(
            incident_id = incident.id,
            classname = %incident.classname,
            "Incident classified"
        );
        Ok(())
    }

    async fn walk_chain(&self, chain: &Chain, incident: &mut Incident) -> Result<RunOutcome, PipelineError> {
        let mut shut_down = false;

        while let Some(next) = chain.next_stage(incident.stage)? {
            // Handlers may edit fields; keep the persisted copy for a halt.
            let mut candidate = incident.clone();
            match stages::run_stage(next, &mut candidate, &self.ctx).await? {
                StageOutcome::Advance => {
                    candidate.stage = next;
                    self.ctx.db.update_atomic(&mut candidate).await?;
                    *incident = candidate;
                    if next == Stage::PortShutdown && incident.permit {
                        shut_down = true;
                    }
                    METRICS.inc_stages_advanced();
                    info!(incident_id = incident.id, stage = %next, chain = %chain.label(), "Stage advanced");
                }
                StageOutcome::Halt(reason) => {
                    METRICS.inc_halts();
                    warn!(
                        incident_id = incident.id,
                        at = %incident.stage,
                        next = %next,
                        reason = %reason,
                        "Chain halted"
                    );
                    return Ok(RunOutcome::Halted {
                        at: incident.stage,
                        reason,
                        shut_down,
                    });
                }
            }
        }

        Ok(RunOutcome::Completed {
            ticket_id: incident.ticket_id.clone(),
            shut_down,
        })
    }
}
