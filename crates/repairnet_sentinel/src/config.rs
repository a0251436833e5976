//! Configuration for detection and remediation
//!
//! Loaded from a TOML file; every field has a default so a missing file or
//! a partial file is valid.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Upper bound for detector window and delay lengths.
pub const MAX_WINDOW_MINUTES: u64 = 365 * 24 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main configuration for RepairNet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairnetConfig {
    /// SQLite incident store; resolved under the RepairNet home when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub actuator: ActuatorConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub ticketing: TicketingConfig,
}

/// Threshold detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Metric name the telemetry query is restricted to
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Samples below this value break a streak
    #[serde(default = "default_threshold_value")]
    pub threshold_value: i64,

    /// Streak length at which an event fires (exact match)
    #[serde(default = "default_threshold_count")]
    pub threshold_count: u32,

    /// Length of the detection window
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// How far the window trails the wall clock (ingestion lag)
    #[serde(default)]
    pub delay_minutes: u64,

    /// Interface name patterns never alerted on (case-insensitive, anchored at start)
    #[serde(default = "default_exclude_interfaces")]
    pub exclude_interfaces: Vec<String>,
}

/// Remediation pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on every collaborator call made by a stage
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Global switch for automated interface shutdown
    #[serde(default)]
    pub allow_shutdown: bool,

    /// Permitted shutdowns per host before the capacity check refuses more
    #[serde(default = "default_max_shutdowns_per_host")]
    pub max_shutdowns_per_host: u64,

    /// In-flight incidents untouched for this long are put back on the admission path
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: u64,

    /// Distinct links handled concurrently within one pass
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

/// Network actuator settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Program invoked as `<command> <host> <interface> <up|down>`; dry run when unset
    #[serde(default)]
    pub command: Option<String>,
}

/// Operator notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Chat webhook; notifications are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub chat_id: Option<String>,

    /// Dashboard base URL linked from notifications
    #[serde(default)]
    pub dashboard_url: Option<String>,
}

/// Escalation ticket settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketingConfig {
    /// Ticket API endpoint; local ticket ids are issued when unset
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub project: Option<String>,
}

fn default_metric() -> String {
    "InErrors".to_string()
}

fn default_threshold_value() -> i64 {
    100
}

fn default_threshold_count() -> u32 {
    5
}

fn default_window_minutes() -> u64 {
    5
}

pub fn default_exclude_interfaces() -> Vec<String> {
    [
        "vlanif",
        "vlan",
        "vl",
        "irb",
        "port-channel",
        "ae",
        "eth-trunk",
        "po",
        "bundle-ether",
        "management",
        "mgmt",
        "fa",
        "null",
        "lo",
        "bond[0-9]",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_stage_timeout_secs() -> u64 {
    60
}

fn default_max_shutdowns_per_host() -> u64 {
    1
}

fn default_stale_after_minutes() -> u64 {
    30
}

fn default_parallelism() -> usize {
    1
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            metric: default_metric(),
            threshold_value: default_threshold_value(),
            threshold_count: default_threshold_count(),
            window_minutes: default_window_minutes(),
            delay_minutes: 0,
            exclude_interfaces: default_exclude_interfaces(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
            allow_shutdown: false,
            max_shutdowns_per_host: default_max_shutdowns_per_host(),
            stale_after_minutes: default_stale_after_minutes(),
            parallelism: default_parallelism(),
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::try_from(self.stale_after_minutes).unwrap_or(i64::MAX / 60_000))
    }
}

impl RepairnetConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RepairnetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.threshold_count == 0 {
            return Err(ConfigError::Invalid(
                "detector.threshold_count must be at least 1".to_string(),
            ));
        }
        if self.detector.window_minutes == 0 {
            return Err(ConfigError::Invalid(
                "detector.window_minutes must be at least 1".to_string(),
            ));
        }
        for (field, value) in [
            ("window_minutes", self.detector.window_minutes),
            ("delay_minutes", self.detector.delay_minutes),
        ] {
            if value > MAX_WINDOW_MINUTES {
                return Err(ConfigError::Invalid(format!(
                    "detector.{} must be at most {} (one year)",
                    field, MAX_WINDOW_MINUTES
                )));
            }
        }
        for pattern in &self.detector.exclude_interfaces {
            RegexBuilder::new(pattern).build().map_err(|e| {
                ConfigError::Invalid(format!("bad exclude_interfaces pattern '{}': {}", pattern, e))
            })?;
        }
        if self.pipeline.parallelism == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.parallelism must be at least 1".to_string(),
            ));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.stage_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepairnetConfig::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.detector.metric, "InErrors");
        assert_eq!(config.detector.threshold_count, 5);
        assert_eq!(config.pipeline.stage_timeout(), Duration::from_secs(60));
        assert!(!config.pipeline.allow_shutdown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = RepairnetConfig::from_toml(
            r#"
            [detector]
            threshold_value = 50
            exclude_interfaces = ["mgmt"]

            [pipeline]
            allow_shutdown = true

            [notify]
            webhook_url = "https://chat.example.net/hook"
            "#,
        )
        .unwrap();

        assert_eq!(config.detector.threshold_value, 50);
        assert_eq!(config.detector.threshold_count, 5);
        assert_eq!(config.detector.exclude_interfaces, vec!["mgmt".to_string()]);
        assert!(config.pipeline.allow_shutdown);
        assert_eq!(config.pipeline.parallelism, 1);
        assert_eq!(config.notify.webhook_url.as_deref(), Some("https://chat.example.net/hook"));
        assert!(config.ticketing.url.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_count = RepairnetConfig::from_toml("[detector]\nthreshold_count = 0\n");
        assert!(matches!(zero_count, Err(ConfigError::Invalid(_))));

        let bad_pattern = RepairnetConfig::from_toml("[detector]\nexclude_interfaces = [\"eth[\"]\n");
        assert!(matches!(bad_pattern, Err(ConfigError::Invalid(_))));

        let huge_delay = RepairnetConfig::from_toml("[detector]\ndelay_minutes = 9000000000000\n");
        assert!(matches!(huge_delay, Err(ConfigError::Invalid(_))));

        let huge_window = RepairnetConfig::from_toml("[detector]\nwindow_minutes = 525601\n");
        assert!(matches!(huge_window, Err(ConfigError::Invalid(_))));

        let year = RepairnetConfig::from_toml("[detector]\ndelay_minutes = 525600\n");
        assert!(year.is_ok());

        let garbage = RepairnetConfig::from_toml("detector = 3");
        assert!(matches!(garbage, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = RepairnetConfig::default();
        config.database_path = Some(PathBuf::from("/var/lib/repairnet/db.sqlite3"));
        config.actuator.command = Some("/usr/local/bin/set-port".to_string());

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = RepairnetConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.database_path, config.database_path);
        assert_eq!(parsed.actuator.command, config.actuator.command);
        assert_eq!(parsed.detector.exclude_interfaces, default_exclude_interfaces());
    }
}
