//! Process-wide counters
//!
//! Lock-free atomics, read as a snapshot at the end of a pass or exported in
//! Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // Detection
    pub events_detected: AtomicU64,
    pub telemetry_failures: AtomicU64,

    // Promotion
    pub incidents_created: AtomicU64,
    pub duplicates: AtomicU64,
    pub unmatched_events: AtomicU64,

    // Pipeline
    pub contention: AtomicU64,
    pub stages_advanced: AtomicU64,
    pub halts: AtomicU64,
    pub shutdowns: AtomicU64,
    pub tickets: AtomicU64,
    pub notification_failures: AtomicU64,

    // Timing (cumulative microseconds)
    pub pass_time_us: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_detected: AtomicU64::new(0),
            telemetry_failures: AtomicU64::new(0),
            incidents_created: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            unmatched_events: AtomicU64::new(0),
            contention: AtomicU64::new(0),
            stages_advanced: AtomicU64::new(0),
            halts: AtomicU64::new(0),
            shutdowns: AtomicU64::new(0),
            tickets: AtomicU64::new(0),
            notification_failures: AtomicU64::new(0),
            pass_time_us: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add_events_detected(&self, n: u64) {
        self.events_detected.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_telemetry_failures(&self) {
        self.telemetry_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_incidents_created(&self) {
        self.incidents_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_duplicates(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_unmatched_events(&self) {
        self.unmatched_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_contention(&self) {
        self.contention.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_stages_advanced(&self) {
        self.stages_advanced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_halts(&self) {
        self.halts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_shutdowns(&self) {
        self.shutdowns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_tickets(&self) {
        self.tickets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_notification_failures(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pass_time(&self, start: Instant) {
        let elapsed_us = start.elapsed().as_micros() as u64;
        self.pass_time_us.fetch_add(elapsed_us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_detected: self.events_detected.load(Ordering::Relaxed),
            telemetry_failures: self.telemetry_failures.load(Ordering::Relaxed),
            incidents_created: self.incidents_created.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            unmatched_events: self.unmatched_events.load(Ordering::Relaxed),
            contention: self.contention.load(Ordering::Relaxed),
            stages_advanced: self.stages_advanced.load(Ordering::Relaxed),
            halts: self.halts.load(Ordering::Relaxed),
            shutdowns: self.shutdowns.load(Ordering::Relaxed),
            tickets: self.tickets.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            pass_time_us: self.pass_time_us.load(Ordering::Relaxed),
        }
    }

    /// Format as Prometheus exposition format
    pub fn prometheus_format(&self) -> String {
        self.snapshot()
            .counters()
            .iter()
            .map(|(name, help, value)| {
                format!(
                    "# HELP repairnet_{name}_total {help}\n# TYPE repairnet_{name}_total counter\nrepairnet_{name}_total {value}\n"
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Immutable snapshot of metrics for reading
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_detected: u64,
    pub telemetry_failures: u64,
    pub incidents_created: u64,
    pub duplicates: u64,
    pub unmatched_events: u64,
    pub contention: u64,
    pub stages_advanced: u64,
    pub halts: u64,
    pub shutdowns: u64,
    pub tickets: u64,
    pub notification_failures: u64,
    pub pass_time_us: u64,
}

impl MetricsSnapshot {
    /// `(name, help, value)` for every counter.
    pub fn counters(&self) -> [(&'static str, &'static str, u64); 12] {
        [
            ("events_detected", "Events emitted by the detector", self.events_detected),
            ("telemetry_failures", "Detection passes without telemetry", self.telemetry_failures),
            ("incidents_created", "Incidents opened from events", self.incidents_created),
            ("duplicates", "Events for links with an open incident", self.duplicates),
            ("unmatched_events", "Events for hosts missing from topology", self.unmatched_events),
            ("contention", "Runs abandoned on a concurrent writer", self.contention),
            ("stages_advanced", "Stage transitions persisted", self.stages_advanced),
            ("halts", "Chains stopped by a stage", self.halts),
            ("shutdowns", "Interfaces shut down", self.shutdowns),
            ("tickets", "Escalation tickets created", self.tickets),
            ("notification_failures", "Operator notifications that failed", self.notification_failures),
            ("pass_time_microseconds", "Cumulative pass time in microseconds", self.pass_time_us),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.inc_halts();
        metrics.inc_halts();
        metrics.add_events_detected(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.halts, 2);
        assert_eq!(snap.events_detected, 3);
        assert_eq!(snap.shutdowns, 0);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.inc_tickets();
        let output = metrics.prometheus_format();
        assert!(output.contains("# TYPE repairnet_tickets_total counter"));
        assert!(output.contains("repairnet_tickets_total 1"));
        assert!(output.contains("repairnet_halts_total 0"));
    }
}
