//! RepairNet sentinel library
//!
//! Detection, classification and staged remediation of interface error
//! bursts. Binaries drive it one pass at a time through [`Sentinel`].

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod detector;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod pipeline;
pub mod promotion;
pub mod roles;
pub mod sentinel;

pub use classifier::{classify, Classification, LinkFacts};
pub use collaborators::{
    InterfaceAction, NetworkActuator, Notifier, RemediationTargets, TelemetrySource, TicketSink,
    TopologySource,
};
pub use config::{ConfigError, RepairnetConfig};
pub use detector::{DetectionWindow, Detector, Event, Sample};
pub use error::{CollaboratorError, PassError, PipelineError, SampleParseError};
pub use inventory::parse_inventory;
pub use metrics::METRICS;
pub use pipeline::{Chain, HaltReason, Pipeline, PipelineRegistry, RunOutcome};
pub use roles::dominant_role;
pub use sentinel::{DetectReport, HandleReport, PassReport, PromotionReport, Sentinel};
