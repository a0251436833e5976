//! `repairnet incidents` - inspection and operator recovery

use super::context::CliContext;
use super::output::{color_for_stage, format_timestamp, print_json, print_summary, print_table_colored, yes_no};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use comfy_table::Color;
use repairnet_db::{Incident, IncidentFilter, Stage};

#[derive(Subcommand, Debug, Clone)]
pub enum IncidentsAction {
    /// List incidents
    List {
        /// Only incidents at this stage (e.g. initial, port_shutdown)
        #[arg(long)]
        stage: Option<String>,

        /// Only incidents on this host
        #[arg(long)]
        hostname: Option<String>,

        /// Maximum number of incidents
        #[arg(long, default_value = "50")]
        limit: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one incident
    Show {
        id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Put an incident back into the pending queue
    Reset { id: i64 },

    /// Release in-flight incidents whose run stopped making progress
    ReleaseStale {
        /// Age threshold (default: pipeline.stale_after_minutes)
        #[arg(long)]
        minutes: Option<u64>,
    },
}

pub async fn run(ctx: &CliContext, action: IncidentsAction) -> Result<()> {
    match action {
        IncidentsAction::List {
            stage,
            hostname,
            limit,
            json,
        } => list(ctx, stage.as_deref(), hostname, limit, json).await,
        IncidentsAction::Show { id, json } => show(ctx, id, json).await,
        IncidentsAction::Reset { id } => reset(ctx, id).await,
        IncidentsAction::ReleaseStale { minutes } => release_stale(ctx, minutes).await,
    }
}

async fn list(
    ctx: &CliContext,
    stage: Option<&str>,
    hostname: Option<String>,
    limit: u32,
    json: bool,
) -> Result<()> {
    let stage = match stage {
        Some(raw) => match Stage::parse(raw) {
            Some(stage) => Some(stage),
            None => bail!(
                "Unknown stage '{}'. Expected one of: {}",
                raw,
                Stage::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ),
        },
        None => None,
    };

    let db = ctx.open_db().await?;
    let filter = IncidentFilter {
        stage,
        hostname,
        limit: Some(limit),
        ..IncidentFilter::default()
    };
    let incidents = db.list_incidents(&filter).await?;

    if json {
        return print_json(&incidents);
    }

    let counts = db.stage_counts().await?;
    let breakdown = counts
        .by_stage
        .iter()
        .map(|(stage, n)| format!("{}={}", stage, n))
        .collect::<Vec<_>>()
        .join(" ");
    println!("{} incidents, {} running [{}]", counts.total, counts.running, breakdown);

    if incidents.is_empty() {
        println!("No incidents match.");
        return Ok(());
    }

    let rows = incidents
        .iter()
        .map(|i| {
            vec![
                (i.id.to_string(), None),
                (i.hostname.clone(), None),
                (i.interface.clone(), None),
                (i.peer.clone(), None),
                (i.classname.to_string(), None),
                (i.stage.to_string(), Some(color_for_stage(i.stage))),
                (yes_no(i.permit), i.permit.then_some(Color::Red)),
                (yes_no(i.running), None),
                (i.ticket_id.clone().unwrap_or_else(|| "-".to_string()), None),
                (format_timestamp(i.created_at), None),
            ]
        })
        .collect();
    print_table_colored(
        &[
            "ID", "Hostname", "Interface", "Peer", "Class", "Stage", "Permit", "Running", "Ticket",
            "Created",
        ],
        rows,
    );
    Ok(())
}

async fn show(ctx: &CliContext, id: i64, json: bool) -> Result<()> {
    let db = ctx.open_db().await?;
    let Some(incident) = db.get_incident(id).await? else {
        bail!("Incident {} not found", id);
    };

    if json {
        return print_json(&incident);
    }
    print_incident(&incident);
    Ok(())
}

async fn reset(ctx: &CliContext, id: i64) -> Result<()> {
    let db = ctx.open_db().await?;
    let incident = db
        .reset_incident(id)
        .await
        .with_context(|| format!("Failed to reset incident {}", id))?;
    println!(
        "Incident {} ({} {}) is pending again at stage {}",
        incident.id, incident.hostname, incident.interface, incident.stage
    );
    Ok(())
}

async fn release_stale(ctx: &CliContext, minutes: Option<u64>) -> Result<()> {
    let older_than = match minutes {
        Some(m) => chrono::Duration::minutes(i64::try_from(m).context("--minutes out of range")?),
        None => ctx.config.pipeline.stale_after(),
    };

    let db = ctx.open_db().await?;
    let released = db.release_stale(older_than).await?;
    println!(
        "Released {} stale incident(s) older than {} minutes",
        released,
        older_than.num_minutes()
    );
    Ok(())
}

fn print_incident(i: &Incident) {
    print_summary(
        &format!("Incident {}", i.id),
        &[
            ("Event", i.event_id.clone()),
            ("Link", format!("{} {} -> {} ({})", i.hostname, i.interface, i.peer, i.link_type)),
            ("Class", i.classname.to_string()),
            ("Roles", format!("{} / {}", i.role_h, i.role_p)),
            ("Status", format!("{} / {}", i.status_h, i.status_p)),
            (
                "Models",
                format!("{} / {}", i.model_h, i.model_p.as_deref().unwrap_or("-")),
            ),
            ("Metric", format!("{} = {}", i.metric_type, i.metric_value)),
            ("Stage", i.stage.to_string()),
            ("Permit", yes_no(i.permit)),
            ("Running", yes_no(i.running)),
            ("Ticket", i.ticket_id.clone().unwrap_or_else(|| "-".to_string())),
            ("Priority", i.priority.clone()),
            ("Assigned", i.assigned_to.clone()),
            ("Created", format_timestamp(i.created_at)),
            ("Updated", format_timestamp(i.updated_at)),
            ("Version", i.version.to_string()),
        ],
    );
}
