//! Persisted RepairNet entities.
//!
//! These types are the single source of truth for what the store reads and
//! writes. Enums are stored as their `as_str()` text and parsed at the row
//! boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Remediation stages
// ============================================================================

/// Position of an incident in the remediation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initial,
    Classification,
    ExistenceCheck,
    BandwidthCheck,
    PortShutdown,
    JiraCreate,
}

impl Stage {
    /// Every stage, in forward order.
    pub const ALL: [Stage; 6] = [
        Stage::Initial,
        Stage::Classification,
        Stage::ExistenceCheck,
        Stage::BandwidthCheck,
        Stage::PortShutdown,
        Stage::JiraCreate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Classification => "classification",
            Self::ExistenceCheck => "existence_check",
            Self::BandwidthCheck => "bandwidth_check",
            Self::PortShutdown => "port_shutdown",
            Self::JiraCreate => "jira_create",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initial" => Some(Self::Initial),
            "classification" => Some(Self::Classification),
            "existence_check" => Some(Self::ExistenceCheck),
            "bandwidth_check" => Some(Self::BandwidthCheck),
            "port_shutdown" => Some(Self::PortShutdown),
            "jira_create" => Some(Self::JiraCreate),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JiraCreate)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Link classification
// ============================================================================

/// Topology relationship between the two endpoints of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkClass {
    #[serde(rename = "peer_uplink")]
    PeerUplink,
    #[serde(rename = "aggregate_spine")]
    AggregateSpine,
    #[serde(rename = "spine_leaf")]
    SpineLeaf,
    #[serde(rename = "core_aggregate__access")]
    CoreAggregateAccess,
    #[serde(rename = "core__cache")]
    CoreCache,
    #[serde(rename = "core_aggregate_border")]
    CoreAggregateBorder,
    #[serde(rename = "unclassified")]
    Unclassified,
}

impl LinkClass {
    /// Labels that own a remediation chain.
    pub const REMEDIABLE: [LinkClass; 6] = [
        LinkClass::PeerUplink,
        LinkClass::AggregateSpine,
        LinkClass::SpineLeaf,
        LinkClass::CoreAggregateAccess,
        LinkClass::CoreCache,
        LinkClass::CoreAggregateBorder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerUplink => "peer_uplink",
            Self::AggregateSpine => "aggregate_spine",
            Self::SpineLeaf => "spine_leaf",
            Self::CoreAggregateAccess => "core_aggregate__access",
            Self::CoreCache => "core__cache",
            Self::CoreAggregateBorder => "core_aggregate_border",
            Self::Unclassified => "unclassified",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "peer_uplink" => Some(Self::PeerUplink),
            "aggregate_spine" => Some(Self::AggregateSpine),
            "spine_leaf" => Some(Self::SpineLeaf),
            "core_aggregate__access" => Some(Self::CoreAggregateAccess),
            "core__cache" => Some(Self::CoreCache),
            "core_aggregate_border" => Some(Self::CoreAggregateBorder),
            "unclassified" => Some(Self::Unclassified),
            _ => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        !matches!(self, Self::Unclassified)
    }
}

impl std::fmt::Display for LinkClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Incidents
// ============================================================================

/// Default priority assigned to every new incident.
pub const DEFAULT_PRIORITY: &str = "Critical";
/// Assignee placeholder until an operator picks the incident up.
pub const UNASSIGNED: &str = "undefined";

/// A durable link-level problem, unique on `(hostname, interface)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub event_id: String,
    pub hostname: String,
    pub interface: String,
    pub link_type: String,
    pub peer: String,
    pub status_h: String,
    /// Empty when the peer is absent from the topology snapshot.
    pub status_p: String,
    pub role_h: String,
    /// Empty when the peer is absent from the topology snapshot.
    pub role_p: String,
    pub model_h: String,
    pub model_p: Option<String>,
    pub classname: LinkClass,
    pub metric_type: String,
    pub metric_value: i64,
    pub assigned_to: String,
    pub created_at: DateTime<Utc>,
    pub priority: String,
    pub stage: Stage,
    /// Gate for the automated mitigation action.
    pub permit: bool,
    /// In-flight marker; set by the classification stage.
    pub running: bool,
    pub ticket_id: Option<String>,
    /// Optimistic-concurrency token, bumped by every successful update.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to insert a new incident at `Stage::Initial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    pub event_id: String,
    pub hostname: String,
    pub interface: String,
    pub link_type: String,
    pub peer: String,
    pub status_h: String,
    pub status_p: String,
    pub role_h: String,
    pub role_p: String,
    pub model_h: String,
    pub model_p: Option<String>,
    pub classname: LinkClass,
    pub metric_type: String,
    pub metric_value: i64,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing incidents. `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub stage: Option<Stage>,
    pub permit: Option<bool>,
    pub running: Option<bool>,
    pub hostname: Option<String>,
    pub limit: Option<u32>,
}

impl IncidentFilter {
    /// The admission filter for starting a new pipeline run.
    pub fn pending() -> Self {
        Self {
            stage: Some(Stage::Initial),
            permit: Some(false),
            running: Some(false),
            ..Self::default()
        }
    }
}

/// Incident counts per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub total: u64,
    pub running: u64,
    pub by_stage: Vec<(Stage, u64)>,
}

// ============================================================================
// Topology
// ============================================================================

/// Status value an endpoint must carry to be remediated.
pub const PRODUCTION_STATUS: &str = "Production";

/// One inventory record from the topology snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyHost {
    pub hostname: String,
    /// Comma-separated role list as delivered by the inventory.
    pub roles: String,
    pub hardware_model: String,
    pub status: String,
}

impl TopologyHost {
    pub fn is_production(&self) -> bool {
        self.status == PRODUCTION_STATUS
    }
}

/// An event whose host was missing from the topology snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedEvent {
    pub hostname: String,
    pub interface: String,
    pub description: String,
    pub link_type: String,
    pub peer: String,
    pub value: i64,
    pub created_at: DateTime<Utc>,
}
