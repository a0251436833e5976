//! Stage handlers
//!
//! Each handler runs the policy check for the stage it owns and reports
//! whether the incident may advance into that stage. Handlers never persist
//! the stage themselves; the pipeline does that after an `Advance`.

use super::StageContext;
use crate::collaborators::InterfaceAction;
use crate::error::{CollaboratorError, PipelineError};
use crate::metrics::METRICS;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use repairnet_db::{Incident, Stage};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Why a chain stopped before reaching its last stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// The opposite direction of the link is already being remediated
    ReverseLinkOpen { incident_id: i64 },
    /// The host already used its shutdown budget
    ShutdownBudgetExhausted { shutdowns: u64 },
    /// The actuator answered but the change failed
    ActuatorFailed(String),
    /// The actuator could not be reached or timed out
    ActuatorUnavailable(String),
    TicketFailed(String),
}

impl HaltReason {
    pub fn is_actuator_unavailable(&self) -> bool {
        matches!(self, Self::ActuatorUnavailable(_))
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReverseLinkOpen { incident_id } => {
                write!(f, "reverse link already in remediation (incident {})", incident_id)
            }
            Self::ShutdownBudgetExhausted { shutdowns } => {
                write!(f, "host shutdown budget exhausted ({} issued)", shutdowns)
            }
            Self::ActuatorFailed(reason) => write!(f, "actuator failed: {}", reason),
            Self::ActuatorUnavailable(reason) => write!(f, "actuator unavailable: {}", reason),
            Self::TicketFailed(reason) => write!(f, "ticket creation failed: {}", reason),
        }
    }
}

/// Result of one stage handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Advance,
    Halt(HaltReason),
}

/// Bound a collaborator call by the stage timeout.
pub async fn bounded<T, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            operation,
            after: limit,
        }),
    }
}

/// Dispatch to the handler owning `stage`.
pub async fn run_stage(
    stage: Stage,
    incident: &mut Incident,
    ctx: &StageContext,
) -> Result<StageOutcome, PipelineError> {
    match stage {
        Stage::ExistenceCheck => existence_check(incident, ctx).await,
        Stage::BandwidthCheck => bandwidth_check(incident, ctx).await,
        Stage::PortShutdown => port_shutdown(incident, ctx).await,
        Stage::JiraCreate => ticket_create(incident, ctx).await,
        Stage::Initial | Stage::Classification => Err(PipelineError::UnknownStage {
            stage: stage.to_string(),
            chain: incident.classname.to_string(),
        }),
    }
}

/// Duplicate suppression: one direction of a link is enough.
async fn existence_check(
    incident: &mut Incident,
    ctx: &StageContext,
) -> Result<StageOutcome, PipelineError> {
    if let Some(reverse) = ctx
        .db
        .find_reverse_link(&incident.hostname, &incident.peer)
        .await?
    {
        if reverse.id != incident.id {
            info!(
                incident_id = incident.id,
                reverse_id = reverse.id,
                "Reverse link already handled"
            );
            return Ok(StageOutcome::Halt(HaltReason::ReverseLinkOpen {
                incident_id: reverse.id,
            }));
        }
    }
    Ok(StageOutcome::Advance)
}

/// Capacity / impact check; grants `permit` when shutdowns are allowed.
async fn bandwidth_check(
    incident: &mut Incident,
    ctx: &StageContext,
) -> Result<StageOutcome, PipelineError> {
    let shutdowns = ctx.db.count_permitted_shutdowns(&incident.hostname).await?;
    if shutdowns >= ctx.config.max_shutdowns_per_host {
        info!(
            incident_id = incident.id,
            hostname = %incident.hostname,
            shutdowns,
            "Shutdown budget exhausted"
        );
        return Ok(StageOutcome::Halt(HaltReason::ShutdownBudgetExhausted {
            shutdowns,
        }));
    }

    incident.permit = ctx.config.allow_shutdown;
    Ok(StageOutcome::Advance)
}

/// Notify the operator and shut the interface, only when permitted.
async fn port_shutdown(
    incident: &mut Incident,
    ctx: &StageContext,
) -> Result<StageOutcome, PipelineError> {
    if !incident.permit {
        info!(incident_id = incident.id, "Shutdown not permitted; bookkeeping only");
        return Ok(StageOutcome::Advance);
    }

    let message = shutdown_message(incident, ctx.dashboard_url.as_deref(), Utc::now());
    let limit = ctx.config.stage_timeout();
    if let Err(e) = bounded("notification", limit, ctx.targets.notifier.send(&message)).await {
        METRICS.inc_notification_failures();
        warn!(incident_id = incident.id, error = %e, "Operator notification failed");
    }

    let call = ctx.targets.actuator.set_interface_state(
        &incident.hostname,
        &incident.interface,
        InterfaceAction::Down,
    );
    match bounded("interface shutdown", limit, call).await {
        Ok(()) => {
            METRICS.inc_shutdowns();
            info!(
                incident_id = incident.id,
                hostname = %incident.hostname,
                interface = %incident.interface,
                "Interface shut down"
            );
            Ok(StageOutcome::Advance)
        }
        Err(e @ (CollaboratorError::Unavailable { .. } | CollaboratorError::Timeout { .. })) => {
            warn!(incident_id = incident.id, error = %e, "Actuator unavailable");
            Ok(StageOutcome::Halt(HaltReason::ActuatorUnavailable(e.to_string())))
        }
        Err(e) => {
            warn!(incident_id = incident.id, error = %e, "Actuator failed");
            Ok(StageOutcome::Halt(HaltReason::ActuatorFailed(e.to_string())))
        }
    }
}

/// Escalate through the ticket sink; the incident leaves flight on success.
async fn ticket_create(
    incident: &mut Incident,
    ctx: &StageContext,
) -> Result<StageOutcome, PipelineError> {
    let limit = ctx.config.stage_timeout();
    match bounded("ticket creation", limit, ctx.targets.tickets.create_ticket(incident)).await {
        Ok(ticket_id) => {
            METRICS.inc_tickets();
            incident.ticket_id = Some(ticket_id);
            incident.running = false;
            Ok(StageOutcome::Advance)
        }
        Err(e) => {
            warn!(incident_id = incident.id, error = %e, "Ticket creation failed");
            Ok(StageOutcome::Halt(HaltReason::TicketFailed(e.to_string())))
        }
    }
}

/// Dashboard link covering 25 minutes before the incident up to 5 minutes after.
///
/// Returns `None` when `base` is not an absolute URL.
pub fn dashboard_link(base: &str, incident: &Incident, now: DateTime<Utc>) -> Option<String> {
    let from = (incident.created_at - ChronoDuration::minutes(25)).timestamp_millis();
    let to = now
        .timestamp_millis()
        .min((incident.created_at + ChronoDuration::minutes(5)).timestamp_millis());

    let mut url = reqwest::Url::parse(base).ok()?;
    url.query_pairs_mut()
        .append_pair("orgId", "1")
        .append_pair("var-node", &incident.hostname)
        .append_pair("var-interface", &incident.interface)
        .append_pair("var-metric", &incident.metric_type)
        .append_pair("from", &from.to_string())
        .append_pair("to", &to.to_string());
    Some(url.into())
}

/// Escape text for an HTML parse-mode chat message
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// HTML operator message for a pending shutdown.
pub fn shutdown_message(incident: &Incident, dashboard_url: Option<&str>, now: DateTime<Utc>) -> String {
    let mut message = format!(
        "Alarm detected!\n\n{}: {}/sec\nClassification: {}\nRequired Action: shutdown interface\n---\nLink: {}  --  {}\nInterface: {}",
        html_escape(&incident.metric_type),
        incident.metric_value,
        incident.classname,
        html_escape(&incident.hostname),
        html_escape(&incident.peer),
        html_escape(&incident.interface),
    );
    if let Some(base) = dashboard_url {
        match dashboard_link(base, incident, now) {
            Some(link) => {
                message.push_str(&format!("\n\n<a href=\"{}\">dashboard</a>", html_escape(&link)));
            }
            None => {
                warn!(incident_id = incident.id, dashboard_url = %base, "Dashboard URL is not absolute; link omitted");
            }
        }
    }
    message
}
