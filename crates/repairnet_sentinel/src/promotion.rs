//! Event promotion
//!
//! Joins detector events with the topology snapshot and opens incidents for
//! links that have none yet.

use crate::classifier::{classify, LinkFacts};
use crate::collaborators::TopologySource;
use crate::detector::Event;
use crate::error::PipelineError;
use crate::metrics::METRICS;
use repairnet_db::{DbError, Incident, IncidentDb, NewIncident, UnmatchedEvent};
use tracing::{debug, info};

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Promotion {
    Created(Incident),
    /// The link direction already has an incident
    AlreadyOpen,
    /// Host missing from the topology snapshot; logged for triage
    HostUnknown,
    /// An endpoint is not in production status
    NotProduction { hostname: String, status: String },
}

/// Promote one event into an incident at stage `initial`.
pub async fn promote_event(
    db: &IncidentDb,
    topology: &dyn TopologySource,
    event: &Event,
) -> Result<Promotion, PipelineError> {
    if db.find_incident(&event.hostname, &event.interface).await?.is_some() {
        METRICS.inc_duplicates();
        debug!(hostname = %event.hostname, interface = %event.interface, "Incident already open");
        return Ok(Promotion::AlreadyOpen);
    }

    let Some(host) = topology.host(&event.hostname).await? else {
        let recorded = db
            .record_unmatched_event(&UnmatchedEvent {
                hostname: event.hostname.clone(),
                interface: event.interface.clone(),
                description: event.description.clone(),
                link_type: event.link_type.clone(),
                peer: event.peer.clone(),
                value: event.value,
                created_at: event.created_at,
            })
            .await?;
        if recorded {
            METRICS.inc_unmatched_events();
        }
        info!(hostname = %event.hostname, interface = %event.interface, "Event host not in topology");
        return Ok(Promotion::HostUnknown);
    };
    if !host.is_production() {
        return Ok(Promotion::NotProduction {
            hostname: host.hostname,
            status: host.status,
        });
    }

    let peer = topology.host(&event.peer).await?;
    if let Some(peer) = &peer {
        if !peer.is_production() {
            return Ok(Promotion::NotProduction {
                hostname: peer.hostname.clone(),
                status: peer.status.clone(),
            });
        }
    }

    let role_p_raw = peer.as_ref().map(|p| p.roles.as_str()).unwrap_or_default();
    let classification = classify(&LinkFacts {
        link_type: &event.link_type,
        hostname: &event.hostname,
        peer: &event.peer,
        role_h: &host.roles,
        role_p: role_p_raw,
    });

    let new = NewIncident {
        event_id: event.event_id.clone(),
        hostname: event.hostname.clone(),
        interface: event.interface.clone(),
        link_type: event.link_type.clone(),
        peer: event.peer.clone(),
        status_h: host.status.clone(),
        status_p: peer.as_ref().map(|p| p.status.clone()).unwrap_or_default(),
        role_h: classification.role_h,
        role_p: classification.role_p,
        model_h: host.hardware_model.clone(),
        model_p: peer.as_ref().map(|p| p.hardware_model.clone()),
        classname: classification.classname,
        metric_type: event.metric_type.clone(),
        metric_value: event.value,
        created_at: event.created_at,
    };

    match db.create_incident(&new).await {
        Ok(incident) => {
            METRICS.inc_incidents_created();
            Ok(Promotion::Created(incident))
        }
        // Lost a race with a concurrent promotion of the same link
        Err(DbError::DuplicateLink { .. }) => {
            METRICS.inc_duplicates();
            Ok(Promotion::AlreadyOpen)
        }
        Err(e) => Err(e.into()),
    }
}
