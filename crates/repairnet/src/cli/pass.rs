//! Pass commands: `detect`, `handle`, `run`

use super::context::CliContext;
use super::output::{print_json, print_summary};
use anyhow::{Context, Result};
use chrono::Utc;
use repairnet_sentinel::{DetectReport, HandleReport, PromotionReport, METRICS};
use std::path::Path;
use tracing::info;

pub async fn detect(ctx: &CliContext, telemetry: &Path, json: bool) -> Result<()> {
    let db = ctx.open_db().await?;
    let sentinel = ctx.sentinel(&db, Some(telemetry))?;

    let (detect, events) = sentinel.detect_pass(Utc::now()).await;
    let promotion = sentinel.promote(&events).await;
    log_counters();

    if json {
        return print_json(&serde_json::json!({
            "detect": detect,
            "promotion": promotion,
            "events": events,
        }));
    }
    print_detect(&detect);
    print_promotion(&promotion);
    Ok(())
}

pub async fn handle(ctx: &CliContext, json: bool) -> Result<()> {
    let db = ctx.open_db().await?;
    let sentinel = ctx.sentinel(&db, None)?;

    let report = sentinel.handle_pass().await.context("Handling pass failed")?;
    log_counters();

    if json {
        return print_json(&report);
    }
    print_handle(&report);
    Ok(())
}

pub async fn run(ctx: &CliContext, telemetry: &Path, metrics_file: Option<&Path>, json: bool) -> Result<()> {
    let db = ctx.open_db().await?;
    let sentinel = ctx.sentinel(&db, Some(telemetry))?;

    let result = sentinel.run_once(Utc::now()).await;
    log_counters();
    if let Some(path) = metrics_file {
        std::fs::write(path, METRICS.prometheus_format())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }
    let report = result.context("Pass failed")?;

    if json {
        return print_json(&report);
    }
    print_detect(&report.detect);
    print_promotion(&report.promotion);
    print_handle(&report.handle);
    Ok(())
}

fn log_counters() {
    let snapshot = METRICS.snapshot();
    info!(
        events = snapshot.events_detected,
        created = snapshot.incidents_created,
        stages = snapshot.stages_advanced,
        halts = snapshot.halts,
        shutdowns = snapshot.shutdowns,
        tickets = snapshot.tickets,
        contention = snapshot.contention,
        "Pass counters"
    );
}

fn print_detect(report: &DetectReport) {
    print_summary(
        "Detection",
        &[
            ("Telemetry", if report.telemetry_available { "ok" } else { "unavailable" }.to_string()),
            ("Samples", report.samples.to_string()),
            ("Events", report.events.to_string()),
        ],
    );
}

fn print_promotion(report: &PromotionReport) {
    print_summary(
        "Promotion",
        &[
            ("Created", report.created.to_string()),
            ("Already open", report.already_open.to_string()),
            ("Host unknown", report.host_unknown.to_string()),
            ("Not production", report.not_production.to_string()),
            ("Failed", report.failed.to_string()),
        ],
    );
}

fn print_handle(report: &HandleReport) {
    print_summary(
        "Remediation",
        &[
            ("Released (stale)", report.released.to_string()),
            ("Pending", report.pending.to_string()),
            ("Completed", report.completed.to_string()),
            ("Halted", report.halted.to_string()),
            ("Unclassified", report.unclassified.to_string()),
            ("Contended", report.contended.to_string()),
            ("Failed", report.failed.to_string()),
            ("Shutdowns", report.shutdowns.to_string()),
        ],
    );
}
