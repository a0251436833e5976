//! In-process fakes of the collaborator traits and store fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use repairnet_db::{Incident, IncidentDb, LinkClass, NewIncident, TopologyHost, PRODUCTION_STATUS};
use repairnet_sentinel::collaborators::InterfaceAction;
use repairnet_sentinel::detector::{DetectionWindow, Sample};
use repairnet_sentinel::{
    CollaboratorError, NetworkActuator, Notifier, RemediationTargets, TelemetrySource, TicketSink,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub async fn open_db() -> (TempDir, IncidentDb) {
    let tmp = TempDir::new().unwrap();
    let db = IncidentDb::open(tmp.path().join("repairnet.sqlite3")).await.unwrap();
    (tmp, db)
}

pub fn host(name: &str, roles: &str) -> TopologyHost {
    TopologyHost {
        hostname: name.to_string(),
        roles: roles.to_string(),
        hardware_model: "QFX5120".to_string(),
        status: PRODUCTION_STATUS.to_string(),
    }
}

/// Store an incident at `initial` without going through promotion.
pub async fn seed_incident(
    db: &IncidentDb,
    hostname: &str,
    interface: &str,
    peer: &str,
    link_type: &str,
    role_h: &str,
    role_p: &str,
) -> Incident {
    db.create_incident(&NewIncident {
        event_id: uuid::Uuid::new_v4().to_string(),
        hostname: hostname.to_string(),
        interface: interface.to_string(),
        link_type: link_type.to_string(),
        peer: peer.to_string(),
        status_h: PRODUCTION_STATUS.to_string(),
        status_p: PRODUCTION_STATUS.to_string(),
        role_h: role_h.to_string(),
        role_p: role_p.to_string(),
        model_h: "QFX5120".to_string(),
        model_p: Some("QFX5120".to_string()),
        classname: LinkClass::Unclassified,
        metric_type: "InErrors".to_string(),
        metric_value: 150,
        created_at: Utc::now(),
    })
    .await
    .unwrap()
}

// ============================================================================
// Telemetry
// ============================================================================

pub struct StaticTelemetry(pub Vec<Sample>);

#[async_trait]
impl TelemetrySource for StaticTelemetry {
    async fn fetch(&self, _: &DetectionWindow, _: &str) -> Result<Vec<Sample>, CollaboratorError> {
        Ok(self.0.clone())
    }
}

pub struct DownTelemetry;

#[async_trait]
impl TelemetrySource for DownTelemetry {
    async fn fetch(&self, _: &DetectionWindow, _: &str) -> Result<Vec<Sample>, CollaboratorError> {
        Err(CollaboratorError::unavailable("telemetry", "connection refused"))
    }
}

// ============================================================================
// Actuator
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ActuatorMode {
    Succeed,
    Reject,
    Unreachable,
}

/// Records every call; hosts in `failing_hosts` get `mode`, the rest succeed.
pub struct RecordingActuator {
    pub calls: Mutex<Vec<(String, String, InterfaceAction)>>,
    mode: ActuatorMode,
    failing_hosts: Option<HashSet<String>>,
    latency: Option<std::time::Duration>,
}

impl RecordingActuator {
    pub fn new(mode: ActuatorMode) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            mode,
            failing_hosts: None,
            latency: None,
        }
    }

    /// Succeeds after `latency`, keeping concurrent runs inside their stage longer.
    pub fn slow(latency: std::time::Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new(ActuatorMode::Succeed)
        }
    }

    pub fn failing_for(hosts: &[&str], mode: ActuatorMode) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            mode,
            failing_hosts: Some(hosts.iter().map(|h| h.to_string()).collect()),
            latency: None,
        }
    }

    pub fn calls(&self) -> Vec<(String, String, InterfaceAction)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkActuator for RecordingActuator {
    async fn set_interface_state(
        &self,
        host: &str,
        interface: &str,
        action: InterfaceAction,
    ) -> Result<(), CollaboratorError> {
        self.calls
            .lock()
            .unwrap()
            .push((host.to_string(), interface.to_string(), action));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let applies = self
            .failing_hosts
            .as_ref()
            .map(|hosts| hosts.contains(host))
            .unwrap_or(true);
        match (applies, self.mode) {
            (true, ActuatorMode::Reject) => Err(CollaboratorError::rejected("actuator", "commit failed")),
            (true, ActuatorMode::Unreachable) => {
                Err(CollaboratorError::unavailable("actuator", "no route to device"))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tickets and notifications
// ============================================================================

#[derive(Default)]
pub struct RecordingTickets {
    pub created: Mutex<Vec<i64>>,
    pub fail: bool,
}

#[async_trait]
impl TicketSink for RecordingTickets {
    async fn create_ticket(&self, incident: &Incident) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::rejected("ticketing", "tracker down"));
        }
        self.created.lock().unwrap().push(incident.id);
        Ok(format!("NET-{}", incident.id))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
    pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), CollaboratorError> {
        self.messages.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(CollaboratorError::unavailable("notifier", "chat unreachable"));
        }
        Ok(())
    }
}

/// Fakes plus the trait-object bundle that points at them.
pub struct Fakes {
    pub actuator: Arc<RecordingActuator>,
    pub tickets: Arc<RecordingTickets>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Fakes {
    pub fn new(actuator: RecordingActuator) -> Self {
        Self::with(actuator, RecordingTickets::default(), RecordingNotifier::default())
    }

    pub fn with(actuator: RecordingActuator, tickets: RecordingTickets, notifier: RecordingNotifier) -> Self {
        Self {
            actuator: Arc::new(actuator),
            tickets: Arc::new(tickets),
            notifier: Arc::new(notifier),
        }
    }

    pub fn targets(&self) -> RemediationTargets {
        RemediationTargets {
            actuator: self.actuator.clone(),
            tickets: self.tickets.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
