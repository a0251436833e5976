//! External collaborators
//!
//! Everything the core talks to outside the incident store sits behind one
//! of these traits. Production adapters live in the submodules; tests swap
//! in fakes.

pub mod actuator;
pub mod notify;
pub mod telemetry;
pub mod ticketing;

use crate::detector::{DetectionWindow, Sample};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use repairnet_db::{Incident, IncidentDb, TopologyHost};
use std::sync::Arc;

pub use actuator::{CommandActuator, DryRunActuator};
pub use notify::{LogNotifier, WebhookNotifier};
pub use telemetry::{JsonLinesTelemetry, NoTelemetry};
pub use ticketing::{HttpTicketSink, LocalTicketSink};

/// Desired administrative state of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterfaceAction {
    Up,
    Down,
}

impl InterfaceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl std::fmt::Display for InterfaceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of metric samples for a detection window.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Samples of `metric` strictly inside `window`, in any order.
    async fn fetch(
        &self,
        window: &DetectionWindow,
        metric: &str,
    ) -> Result<Vec<Sample>, CollaboratorError>;
}

/// Lookup of inventory records by hostname.
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn host(&self, hostname: &str) -> Result<Option<TopologyHost>, CollaboratorError>;
}

/// Applies interface state changes on network devices.
#[async_trait]
pub trait NetworkActuator: Send + Sync {
    async fn set_interface_state(
        &self,
        host: &str,
        interface: &str,
        action: InterfaceAction,
    ) -> Result<(), CollaboratorError>;
}

/// Escalation ticket sink.
#[async_trait]
pub trait TicketSink: Send + Sync {
    /// Open a ticket for the incident and return its id.
    async fn create_ticket(&self, incident: &Incident) -> Result<String, CollaboratorError>;
}

/// Operator notification channel. Callers treat failures as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), CollaboratorError>;
}

/// The topology snapshot imported into the incident database.
#[async_trait]
impl TopologySource for IncidentDb {
    async fn host(&self, hostname: &str) -> Result<Option<TopologyHost>, CollaboratorError> {
        self.get_host(hostname)
            .await
            .map_err(|e| CollaboratorError::unavailable("topology", e.to_string()))
    }
}

/// Collaborators used by the remediation stages.
#[derive(Clone)]
pub struct RemediationTargets {
    pub actuator: Arc<dyn NetworkActuator>,
    pub tickets: Arc<dyn TicketSink>,
    pub notifier: Arc<dyn Notifier>,
}

impl RemediationTargets {
    /// Side-effect free targets: dry-run actuator, local tickets, log-only notifications.
    pub fn offline() -> Self {
        Self {
            actuator: Arc::new(DryRunActuator),
            tickets: Arc::new(LocalTicketSink),
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl std::fmt::Debug for RemediationTargets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationTargets").finish_non_exhaustive()
    }
}
