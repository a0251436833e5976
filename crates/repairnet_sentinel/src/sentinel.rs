//! Pass orchestration
//!
//! One call to [`Sentinel::run_once`] is one externally triggered pass:
//! detect, promote, release stale runs, then handle pending incidents.

use crate::collaborators::{RemediationTargets, TelemetrySource, TopologySource};
use crate::config::{ConfigError, RepairnetConfig};
use crate::detector::{DetectionWindow, Detector, Event};
use crate::error::{PassError, PipelineError};
use crate::metrics::METRICS;
use crate::pipeline::{HaltReason, Pipeline, PipelineRegistry, RunOutcome};
use crate::promotion::{promote_event, Promotion};
use chrono::{DateTime, Utc};
use repairnet_db::{Incident, IncidentDb, LockKey};
use std::collections::HashSet;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Result of a detection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectReport {
    pub samples: usize,
    pub events: usize,
    pub telemetry_available: bool,
}

/// Result of promoting a batch of events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    pub created: usize,
    pub already_open: usize,
    pub host_unknown: usize,
    pub not_production: usize,
    pub failed: usize,
}

/// Result of a handling pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandleReport {
    pub released: u64,
    pub pending: usize,
    pub completed: usize,
    pub halted: usize,
    pub unclassified: usize,
    pub contended: usize,
    pub not_pending: usize,
    pub failed: usize,
    pub shutdowns: usize,
    pub actuator_unavailable: usize,
}

impl HandleReport {
    fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed { shut_down, .. } => {
                self.completed += 1;
                self.shutdowns += usize::from(*shut_down);
            }
            RunOutcome::Halted { reason, shut_down, .. } => {
                self.halted += 1;
                self.shutdowns += usize::from(*shut_down);
                self.actuator_unavailable += usize::from(reason.is_actuator_unavailable());
            }
            RunOutcome::Unclassified => self.unclassified += 1,
            RunOutcome::Contended => self.contended += 1,
            RunOutcome::NotPending => self.not_pending += 1,
        }
    }
}

/// Result of a full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub detect: DetectReport,
    pub promotion: PromotionReport,
    pub handle: HandleReport,
}

/// Partition pending incidents into groups that share no host or link pair.
///
/// Groups run concurrently; incidents inside a group run one after another in
/// id order, so the policy checks of one see the persisted result of the other.
fn conflict_groups(pending: &[Incident]) -> Vec<Vec<i64>> {
    let mut groups: Vec<(HashSet<LockKey>, Vec<i64>)> = Vec::new();

    for incident in pending {
        let mut keys: HashSet<LockKey> = LockKey::scope(&incident.hostname, &incident.peer)
            .into_iter()
            .collect();
        let mut ids = vec![incident.id];

        let mut i = 0;
        while i < groups.len() {
            if groups[i].0.is_disjoint(&keys) {
                i += 1;
            } else {
                let (other_keys, other_ids) = groups.swap_remove(i);
                keys.extend(other_keys);
                ids.extend(other_ids);
            }
        }
        groups.push((keys, ids));
    }

    groups
        .into_iter()
        .map(|(_, mut ids)| {
            ids.sort_unstable();
            ids
        })
        .collect()
}

/// Detection and remediation bound to one store and one set of collaborators.
pub struct Sentinel {
    db: IncidentDb,
    config: RepairnetConfig,
    detector: Detector,
    telemetry: Arc<dyn TelemetrySource>,
    topology: Arc<dyn TopologySource>,
    pipeline: Pipeline,
}

impl Sentinel {
    /// Build a sentinel with the standard chain registry.
    pub fn new(
        db: IncidentDb,
        config: RepairnetConfig,
        telemetry: Arc<dyn TelemetrySource>,
        topology: Arc<dyn TopologySource>,
        targets: RemediationTargets,
    ) -> Result<Self, ConfigError> {
        Self::with_registry(db, config, telemetry, topology, targets, PipelineRegistry::standard())
    }

    pub fn with_registry(
        db: IncidentDb,
        config: RepairnetConfig,
        telemetry: Arc<dyn TelemetrySource>,
        topology: Arc<dyn TopologySource>,
        targets: RemediationTargets,
        registry: PipelineRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let detector = Detector::new(&config.detector)
            .map_err(|e| ConfigError::Invalid(format!("exclude_interfaces: {}", e)))?;
        let pipeline = Pipeline::new(
            db.clone(),
            registry,
            targets,
            config.pipeline.clone(),
            config.notify.dashboard_url.clone(),
        );

        Ok(Self {
            db,
            config,
            detector,
            telemetry,
            topology,
            pipeline,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Fetch the trailing window ending at `now` and run the detector over it.
    ///
    /// An unavailable telemetry source yields no events, not an error.
    pub async fn detect_pass(&self, now: DateTime<Utc>) -> (DetectReport, Vec<Event>) {
        let window = DetectionWindow::from_config(now, &self.config.detector);
        let limit = self.config.pipeline.stage_timeout();
        let fetch = self.telemetry.fetch(&window, &self.config.detector.metric);

        let samples = match crate::pipeline::stages::bounded("telemetry fetch", limit, fetch).await {
            Ok(samples) => samples,
            Err(e) => {
                METRICS.inc_telemetry_failures();
                warn!(error = %e, start = %window.start, end = %window.end, "Telemetry unavailable; no events this window");
                return (DetectReport::default(), Vec::new());
            }
        };

        let events = self.detector.detect(&samples);
        METRICS.add_events_detected(events.len() as u64);
        info!(samples = samples.len(), events = events.len(), "Detection pass finished");

        let report = DetectReport {
            samples: samples.len(),
            events: events.len(),
            telemetry_available: true,
        };
        (report, events)
    }

    /// Promote events one by one; a failure on one event never stops the rest.
    pub async fn promote(&self, events: &[Event]) -> PromotionReport {
        let mut report = PromotionReport::default();
        for event in events {
            match promote_event(&self.db, self.topology.as_ref(), event).await {
                Ok(Promotion::Created(incident)) => {
                    report.created += 1;
                    info!(
                        incident_id = incident.id,
                        hostname = %incident.hostname,
                        interface = %incident.interface,
                        classname = %incident.classname,
                        "Incident opened"
                    );
                }
                Ok(Promotion::AlreadyOpen) => report.already_open += 1,
                Ok(Promotion::HostUnknown) => report.host_unknown += 1,
                Ok(Promotion::NotProduction { hostname, status }) => {
                    report.not_production += 1;
                    info!(hostname = %hostname, status = %status, "Endpoint not in production; event dropped");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(hostname = %event.hostname, interface = %event.interface, error = %e, "Event promotion failed");
                }
            }
        }
        report
    }

    /// Release stranded runs, then drive every pending incident.
    ///
    /// Per-incident failures are counted and logged. Only an unreadable store
    /// or an actuator unreachable for every attempted shutdown fails the pass.
    pub async fn handle_pass(&self) -> Result<HandleReport, PassError> {
        let mut report = HandleReport {
            released: self.db.release_stale(self.config.pipeline.stale_after()).await?,
            ..HandleReport::default()
        };

        let pending = self.db.select_pending().await?;
        report.pending = pending.len();
        if pending.is_empty() {
            info!("No pending incidents");
            return Ok(report);
        }
        info!(pending = pending.len(), "Handling pending incidents");

        let mut last_actuator_error = None;
        let mut tally = |report: &mut HandleReport,
                         incident_id: i64,
                         result: Result<RunOutcome, PipelineError>| match result {
            Ok(outcome) => {
                if let RunOutcome::Halted { reason: HaltReason::ActuatorUnavailable(msg), .. } = &outcome {
                    last_actuator_error = Some(msg.clone());
                }
                report.record(&outcome);
            }
            Err(e) => {
                report.failed += 1;
                error!(incident_id, error = %e, "Pipeline run failed");
            }
        };

        let parallelism = self.config.pipeline.parallelism.max(1);
        if parallelism == 1 {
            for incident in &pending {
                let result = self.pipeline.run_incident(incident.id).await;
                tally(&mut report, incident.id, result);
            }
        } else {
            let permits = Arc::new(Semaphore::new(parallelism));
            let mut tasks = JoinSet::new();
            for group in conflict_groups(&pending) {
                let pipeline = self.pipeline.clone();
                let permits = Arc::clone(&permits);
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    let mut results = Vec::with_capacity(group.len());
                    for incident_id in group {
                        results.push((incident_id, pipeline.run_incident(incident_id).await));
                    }
                    results
                });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(results) => {
                        for (incident_id, result) in results {
                            tally(&mut report, incident_id, result);
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        error!(error = %e, "Pipeline task aborted");
                    }
                }
            }
        }

        info!(
            released = report.released,
            completed = report.completed,
            halted = report.halted,
            unclassified = report.unclassified,
            contended = report.contended,
            failed = report.failed,
            "Handling pass finished"
        );

        if report.actuator_unavailable > 0 && report.shutdowns == 0 {
            return Err(PassError::ActuatorUnavailable {
                attempts: report.actuator_unavailable,
                last_error: last_actuator_error.unwrap_or_default(),
            });
        }
        Ok(report)
    }

    /// One complete pass.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<PassReport, PassError> {
        let start = Instant::now();
        let (detect, events) = self.detect_pass(now).await;
        let promotion = self.promote(&events).await;
        let handle = self.handle_pass().await;
        METRICS.record_pass_time(start);

        Ok(PassReport {
            detect,
            promotion,
            handle: handle?,
        })
    }
}
