//! Error types for detection, collaborators and the remediation pipeline.

use repairnet_db::DbError;
use std::time::Duration;
use thiserror::Error;

/// A telemetry path that does not follow
/// `<hostname>.interfaces.<interface>.<description>.<metric-type>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed telemetry path: {path}")]
pub struct SampleParseError {
    pub path: String,
}

/// Failure of an external collaborator (telemetry, actuator, ticketing, notification).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Source unreachable or unreadable
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    /// The call exceeded its time budget
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The collaborator answered but refused or failed the request
    #[error("{service} rejected request: {reason}")]
    Rejected { service: &'static str, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollaboratorError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn rejected(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            reason: reason.into(),
        }
    }
}

/// Failure inside one pipeline run. Always scoped to a single incident.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// A persisted stage has no handler in the chain it was routed to
    #[error("No handler for stage {stage} in chain {chain}")]
    UnknownStage { stage: String, chain: String },
}

impl PipelineError {
    /// Another writer owns the record; the run is abandoned for this pass.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_contention())
    }
}

/// Failure that aborts a whole pass and is reported to the trigger.
#[derive(Debug, Error)]
pub enum PassError {
    /// The incident store could not be read for admission
    #[error("Incident store unavailable: {0}")]
    Store(#[from] DbError),

    /// Every shutdown attempted in the pass failed to reach the actuator
    #[error("Actuator unreachable for the whole pass ({attempts} attempts): {last_error}")]
    ActuatorUnavailable { attempts: usize, last_error: String },
}
