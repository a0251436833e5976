//! Threshold detector
//!
//! Turns one window of telemetry samples into discrete events. Counting state
//! lives only for the duration of a single `detect` call.

use crate::config::DetectorConfig;
use crate::error::SampleParseError;
use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info};

/// Extra lead-in added to the window start so boundary samples are not missed.
const WINDOW_LEAD_IN_SECS: i64 = 10;

/// Description value meaning "no description configured on the port".
const NO_DESCRIPTION: &str = "none";

/// One telemetry data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// `<hostname>.interfaces.<interface>.<description>.<metric-type>`
    pub path: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Components of a sample path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePath {
    pub hostname: String,
    pub interface: String,
    pub description: String,
    pub metric_type: String,
}

/// A confirmed sustained-error condition on one link direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub hostname: String,
    pub interface: String,
    pub description: String,
    pub link_type: String,
    pub peer: String,
    pub metric_type: String,
    pub value: i64,
    pub created_at: DateTime<Utc>,
}

/// Half-open query window; samples must fall strictly inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DetectionWindow {
    /// Window ending `delay` before `now` and spanning `length` plus a short lead-in.
    ///
    /// Bounds that fall before the earliest representable instant saturate there.
    pub fn trailing(now: DateTime<Utc>, length: Duration, delay: Duration) -> Self {
        let end = now.checked_sub_signed(delay).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let start = end
            .checked_sub_signed(length)
            .and_then(|t| t.checked_sub_signed(Duration::seconds(WINDOW_LEAD_IN_SECS)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end }
    }

    pub fn from_config(now: DateTime<Utc>, config: &DetectorConfig) -> Self {
        Self::trailing(
            now,
            Duration::minutes(minutes(config.window_minutes)),
            Duration::minutes(minutes(config.delay_minutes)),
        )
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts > self.start && ts < self.end
    }
}

fn minutes(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX / 60_000)
}

// Compiled patterns for path and description parsing
static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\.interfaces\.(.*?)\.(.*?)\.(.*)$").expect("valid path pattern")
});
static LINK_TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-([A-Z])-").expect("valid link type pattern"));

/// Split a sample path into its components. Every component must be non-empty.
pub fn parse_sample_path(path: &str) -> Result<SamplePath, SampleParseError> {
    let err = || SampleParseError {
        path: path.to_string(),
    };
    let caps = PATH_PATTERN.captures(path).ok_or_else(err)?;

    let part = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
    let (hostname, interface, description, metric_type) = (part(1), part(2), part(3), part(4));
    if hostname.is_empty() || interface.is_empty() || description.is_empty() || metric_type.is_empty() {
        return Err(err());
    }

    Ok(SamplePath {
        hostname: hostname.to_string(),
        interface: interface.to_string(),
        description: description.to_string(),
        metric_type: metric_type.to_string(),
    })
}

/// Extract `(link_type, peer)` from a port description such as `-P-peerB_uplink`.
///
/// The link type is the first `-X-` marker. The peer is the first `_` token
/// of the description with every marker removed.
pub fn parse_link_marker(description: &str) -> Option<(String, String)> {
    let pattern = &*LINK_TYPE_PATTERN;
    let link_type = pattern.captures(description)?.get(1)?.as_str().to_string();

    let stripped = pattern.replace_all(description, "");
    let peer = stripped
        .trim_start_matches('_')
        .split('_')
        .next()
        .unwrap_or_default()
        .to_string();

    Some((link_type, peer))
}

/// Round a raw metric value; non-finite values count as 0.
fn round_value(value: f64) -> i64 {
    if value.is_finite() {
        // Halves go to the even neighbour; `as` saturates at the i64 bounds
        value.round_ties_even() as i64
    } else {
        0
    }
}

/// Exact-threshold streak detector.
#[derive(Debug, Clone)]
pub struct Detector {
    threshold_value: i64,
    threshold_count: u32,
    exclusions: Vec<Regex>,
}

impl Detector {
    pub fn new(config: &DetectorConfig) -> Result<Self, regex::Error> {
        let exclusions = config
            .exclude_interfaces
            .iter()
            .map(|pattern| {
                RegexBuilder::new(&format!("^(?:{})", pattern))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            threshold_value: config.threshold_value,
            threshold_count: config.threshold_count,
            exclusions,
        })
    }

    pub fn is_excluded(&self, interface: &str) -> bool {
        self.exclusions.iter().any(|re| re.is_match(interface))
    }

    /// Run one detection pass.
    ///
    /// Samples are processed in timestamp order. A value below the threshold
    /// resets that link's streak; excluded interfaces, `none` descriptions and
    /// descriptions without a link marker are skipped without resetting it.
    /// An event fires when a streak reaches exactly the threshold count, and
    /// at most once per link per pass.
    pub fn detect(&self, samples: &[Sample]) -> Vec<Event> {
        let mut ordered: Vec<&Sample> = samples.iter().collect();
        ordered.sort_by_key(|s| s.timestamp);

        let mut streaks: HashMap<(String, String), u32> = HashMap::new();
        let mut fired: HashSet<(String, String)> = HashSet::new();
        let mut events = Vec::new();

        for sample in ordered {
            let parsed = match parse_sample_path(&sample.path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    debug!(error = %e, "Dropping sample");
                    continue;
                }
            };
            let key = (parsed.hostname.clone(), parsed.interface.clone());
            let value = round_value(sample.value);

            if value < self.threshold_value {
                streaks.insert(key, 0);
                continue;
            }
            if self.is_excluded(&parsed.interface) {
                continue;
            }
            if parsed.description.eq_ignore_ascii_case(NO_DESCRIPTION) {
                continue;
            }
            let Some((link_type, peer)) = parse_link_marker(&parsed.description) else {
                continue;
            };

            let count = streaks.entry(key.clone()).or_insert(0);
            *count += 1;
            debug!(
                hostname = %parsed.hostname,
                interface = %parsed.interface,
                value,
                count = *count,
                "Threshold exceeded"
            );

            if *count != self.threshold_count || fired.contains(&key) {
                continue;
            }

            info!(
                hostname = %parsed.hostname,
                interface = %parsed.interface,
                link_type = %link_type,
                peer = %peer,
                value,
                "Event detected"
            );
            fired.insert(key);
            events.push(Event {
                event_id: uuid::Uuid::new_v4().to_string(),
                hostname: parsed.hostname,
                interface: parsed.interface,
                description: parsed.description,
                link_type,
                peer,
                metric_type: parsed.metric_type,
                value,
                created_at: sample.timestamp,
            });
        }

        events
    }
}
