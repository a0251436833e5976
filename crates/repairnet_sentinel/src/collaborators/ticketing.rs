//! Escalation ticket adapters

use super::TicketSink;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use repairnet_db::Incident;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Issues local ticket ids without contacting any tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTicketSink;

#[async_trait]
impl TicketSink for LocalTicketSink {
    async fn create_ticket(&self, incident: &Incident) -> Result<String, CollaboratorError> {
        let ticket_id = format!("LOCAL-{}", uuid::Uuid::new_v4().simple());
        info!(
            incident_id = incident.id,
            ticket_id = %ticket_id,
            "Local escalation ticket issued"
        );
        Ok(ticket_id)
    }
}

#[derive(Serialize)]
struct TicketRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<&'a str>,
    summary: String,
    description: String,
    priority: &'a str,
    assignee: &'a str,
}

#[derive(Deserialize)]
struct TicketResponse {
    #[serde(alias = "key")]
    id: String,
}

/// Creates tickets through a JSON HTTP endpoint returning `{"id": ...}` or `{"key": ...}`.
#[derive(Debug, Clone)]
pub struct HttpTicketSink {
    http_client: reqwest::Client,
    url: String,
    project: Option<String>,
}

impl HttpTicketSink {
    pub fn new(
        url: impl Into<String>,
        project: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: url.into(),
            project,
        })
    }
}

fn ticket_summary(incident: &Incident) -> String {
    format!(
        "{} on {} {} ({})",
        incident.metric_type, incident.hostname, incident.interface, incident.classname
    )
}

fn ticket_description(incident: &Incident) -> String {
    format!(
        "{}: {}/sec\nLink: {} -- {}\nInterface: {}\nRoles: {} / {}\nStage: {}\nEvent: {}",
        incident.metric_type,
        incident.metric_value,
        incident.hostname,
        incident.peer,
        incident.interface,
        incident.role_h,
        incident.role_p,
        incident.stage,
        incident.event_id,
    )
}

#[async_trait]
impl TicketSink for HttpTicketSink {
    async fn create_ticket(&self, incident: &Incident) -> Result<String, CollaboratorError> {
        let request = TicketRequest {
            project: self.project.as_deref(),
            summary: ticket_summary(incident),
            description: ticket_description(incident),
            priority: &incident.priority,
            assignee: &incident.assigned_to,
        };

        let response = self.http_client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(CollaboratorError::rejected(
                "ticketing",
                format!("tracker returned {}", response.status()),
            ));
        }

        let ticket: TicketResponse = response.json().await?;
        info!(incident_id = incident.id, ticket_id = %ticket.id, "Escalation ticket created");
        Ok(ticket.id)
    }
}
