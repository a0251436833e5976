//! Shared command context: configuration, store and collaborators

use anyhow::{Context, Result};
use repairnet_db::IncidentDb;
use repairnet_sentinel::collaborators::{
    CommandActuator, DryRunActuator, HttpTicketSink, JsonLinesTelemetry, LocalTicketSink,
    LogNotifier, NoTelemetry, WebhookNotifier,
};
use repairnet_sentinel::{
    NetworkActuator, Notifier, RemediationTargets, RepairnetConfig, Sentinel, TelemetrySource,
    TicketSink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const CONFIG_FILE: &str = "repairnet.toml";
const DATABASE_FILE: &str = "repairnet.sqlite3";

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: RepairnetConfig,
    /// Where the configuration came from; `None` when defaults are in use
    pub config_path: Option<PathBuf>,
    pub database_path: PathBuf,
}

impl CliContext {
    /// Load an explicit config file, or `$REPAIRNET_HOME/repairnet.toml` when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let home = repairnet_logging::repairnet_home();
        Self::load_from(explicit, &home)
    }

    fn load_from(explicit: Option<&Path>, home: &Path) -> Result<Self> {
        let (config, config_path) = match explicit {
            Some(path) => {
                let config = RepairnetConfig::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?;
                (config, Some(path.to_path_buf()))
            }
            None => {
                let default_path = home.join(CONFIG_FILE);
                if default_path.exists() {
                    let config = RepairnetConfig::load(&default_path)
                        .with_context(|| format!("Failed to load config {}", default_path.display()))?;
                    (config, Some(default_path))
                } else {
                    (RepairnetConfig::default(), None)
                }
            }
        };

        let database_path = config
            .database_path
            .clone()
            .unwrap_or_else(|| home.join(DATABASE_FILE));

        Ok(Self {
            config,
            config_path,
            database_path,
        })
    }

    pub async fn open_db(&self) -> Result<IncidentDb> {
        IncidentDb::open(&self.database_path)
            .await
            .with_context(|| format!("Failed to open incident store {}", self.database_path.display()))
    }

    /// Production collaborators chosen by configuration; unset sections fall back to offline adapters.
    pub fn targets(&self) -> Result<RemediationTargets> {
        let timeout = self.config.pipeline.stage_timeout();

        let actuator: Arc<dyn NetworkActuator> = match &self.config.actuator.command {
            Some(program) => Arc::new(CommandActuator::new(program.clone())),
            None => Arc::new(DryRunActuator),
        };
        let tickets: Arc<dyn TicketSink> = match &self.config.ticketing.url {
            Some(url) => Arc::new(
                HttpTicketSink::new(url.clone(), self.config.ticketing.project.clone(), timeout)
                    .context("Failed to build ticketing client")?,
            ),
            None => Arc::new(LocalTicketSink),
        };
        let notifier: Arc<dyn Notifier> = match &self.config.notify.webhook_url {
            Some(url) => Arc::new(
                WebhookNotifier::new(url.clone(), self.config.notify.chat_id.clone(), timeout)
                    .context("Failed to build notification client")?,
            ),
            None => Arc::new(LogNotifier),
        };

        Ok(RemediationTargets {
            actuator,
            tickets,
            notifier,
        })
    }

    /// Sentinel over this store; without a telemetry export only handling is possible.
    pub fn sentinel(&self, db: &IncidentDb, telemetry: Option<&Path>) -> Result<Sentinel> {
        let source: Arc<dyn TelemetrySource> = match telemetry {
            Some(path) => Arc::new(JsonLinesTelemetry::new(path)),
            None => Arc::new(NoTelemetry),
        };
        info!(
            database = %self.database_path.display(),
            telemetry = ?telemetry,
            dry_run = self.config.actuator.command.is_none(),
            "Building sentinel"
        );
        Sentinel::new(
            db.clone(),
            self.config.clone(),
            source,
            Arc::new(db.clone()),
            self.targets()?,
        )
        .context("Invalid configuration")
    }
}
