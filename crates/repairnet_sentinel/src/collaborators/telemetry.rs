//! Newline-delimited JSON telemetry export

use super::TelemetrySource;
use crate::detector::{DetectionWindow, Sample};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

/// Reads samples from a file of `{"path", "value", "timestamp"}` lines.
#[derive(Debug, Clone)]
pub struct JsonLinesTelemetry {
    path: PathBuf,
}

impl JsonLinesTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TelemetrySource for JsonLinesTelemetry {
    async fn fetch(
        &self,
        window: &DetectionWindow,
        metric: &str,
    ) -> Result<Vec<Sample>, CollaboratorError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CollaboratorError::unavailable(
                "telemetry",
                format!("{}: {}", self.path.display(), e),
            )
        })?;

        let mut samples = Vec::new();
        let mut malformed = 0usize;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Sample>(line) {
                Ok(sample) => {
                    if sample.path.contains(metric) && window.contains(sample.timestamp) {
                        samples.push(sample);
                    }
                }
                Err(e) => {
                    malformed += 1;
                    debug!(error = %e, "Skipping malformed telemetry line");
                }
            }
        }

        info!(
            source = %self.path.display(),
            samples = samples.len(),
            malformed,
            "Telemetry window loaded"
        );
        Ok(samples)
    }
}

/// Placeholder source for handling-only invocations; every fetch is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTelemetry;

#[async_trait]
impl TelemetrySource for NoTelemetry {
    async fn fetch(&self, _: &DetectionWindow, _: &str) -> Result<Vec<Sample>, CollaboratorError> {
        Err(CollaboratorError::unavailable("telemetry", "no telemetry source configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_filters_by_metric_and_window() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("telemetry.jsonl");
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let line = |path: &str, value: f64, offset: i64| {
            serde_json::to_string(&Sample {
                path: path.to_string(),
                value,
                timestamp: base + Duration::seconds(offset),
            })
            .unwrap()
        };
        let content = [
            line("sw1.interfaces.eth0.-P-peer_x.InErrors", 120.0, 10),
            line("sw1.interfaces.eth0.-P-peer_x.OutOctets", 9e9, 10),
            line("sw1.interfaces.eth0.-P-peer_x.InErrors", 120.0, 400),
            "not json".to_string(),
            String::new(),
        ]
        .join("\n");
        std::fs::write(&file, content).unwrap();

        let window = DetectionWindow {
            start: base,
            end: base + Duration::minutes(5),
        };
        let samples = JsonLinesTelemetry::new(&file)
            .fetch(&window, "InErrors")
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 120.0);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        let window = DetectionWindow { start: now, end: now };
        let err = JsonLinesTelemetry::new(tmp.path().join("absent.jsonl"))
            .fetch(&window, "InErrors")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_no_telemetry_is_always_unavailable() {
        let now = Utc::now();
        let window = DetectionWindow { start: now, end: now };
        let err = NoTelemetry.fetch(&window, "InErrors").await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable { service: "telemetry", .. }));
    }
}
