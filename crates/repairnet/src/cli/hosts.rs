//! `repairnet hosts` - topology snapshot import and listing

use super::context::CliContext;
use super::output::{print_json, print_table_colored};
use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::Color;
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone)]
pub enum HostsAction {
    /// Replace the topology snapshot from an inventory JSON export
    Import {
        /// Inventory file (array of host records)
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List hosts in the current snapshot
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List events whose host was missing from the snapshot
    Unmatched {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(ctx: &CliContext, action: HostsAction) -> Result<()> {
    match action {
        HostsAction::Import { file, json } => import(ctx, &file, json).await,
        HostsAction::List { json } => list(ctx, json).await,
        HostsAction::Unmatched { json } => unmatched(ctx, json).await,
    }
}

async fn import(ctx: &CliContext, file: &std::path::Path, json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read inventory {}", file.display()))?;
    let hosts = repairnet_sentinel::parse_inventory(&raw)
        .with_context(|| format!("Invalid inventory {}", file.display()))?;

    let db = ctx.open_db().await?;
    let imported = db
        .replace_topology(&hosts)
        .await
        .context("Failed to replace topology snapshot")?;
    let production = hosts.iter().filter(|h| h.is_production()).count();

    if json {
        return print_json(&serde_json::json!({
            "imported": imported,
            "production": production,
        }));
    }
    println!(
        "Imported {} hosts ({} in production) from {}",
        imported,
        production,
        file.display()
    );
    Ok(())
}

async fn list(ctx: &CliContext, json: bool) -> Result<()> {
    let db = ctx.open_db().await?;
    let hosts = db.list_hosts().await?;

    if json {
        return print_json(&hosts);
    }
    if hosts.is_empty() {
        println!("Topology snapshot is empty. Import one with `repairnet hosts import <file>`.");
        return Ok(());
    }

    let rows = hosts
        .iter()
        .map(|host| {
            let status_color = if host.is_production() {
                Color::Green
            } else {
                Color::DarkGrey
            };
            vec![
                (host.hostname.clone(), None),
                (host.roles.clone(), None),
                (host.hardware_model.clone(), None),
                (host.status.clone(), Some(status_color)),
            ]
        })
        .collect();
    print_table_colored(&["Hostname", "Roles", "Model", "Status"], rows);
    Ok(())
}

async fn unmatched(ctx: &CliContext, json: bool) -> Result<()> {
    let db = ctx.open_db().await?;
    let events = db.list_unmatched_events().await?;

    if json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No unmatched events.");
        return Ok(());
    }

    let rows = events
        .iter()
        .map(|e| {
            vec![
                (super::output::format_timestamp(e.created_at), None),
                (e.hostname.clone(), Some(Color::Yellow)),
                (e.interface.clone(), None),
                (e.link_type.clone(), None),
                (e.peer.clone(), None),
                (e.value.to_string(), None),
            ]
        })
        .collect();
    print_table_colored(&["Seen", "Hostname", "Interface", "Type", "Peer", "Value"], rows);
    Ok(())
}
