//! Alert rule types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::metric::MetricSample;

/// Identity of a persisted topology
pub type TopologyId = u64;

pub const DEFAULT_METRIC: &str = "cpu";
pub const DEFAULT_OPERATOR: &str = ">=";
pub const DEFAULT_THRESHOLD: f64 = 70.0;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3600);

/// Threshold rule derived from one action node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Id of the originating action node
    pub id: String,
    pub topology_id: TopologyId,
    /// Device name the rule watches
    pub device_id: String,
    pub metric: MetricKind,
    pub operator: Operator,
    pub threshold: f64,
    pub notify_to: String,
    pub notify_subject: String,
    pub notify_body: String,
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    #[serde(default)]
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl AlertRule {
    /// Whether `value` satisfies this rule's condition
    pub fn is_breached_by(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }
}

/// Sample field a rule reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Cpu,
    Ram,
    Disk,
    Temp,
    /// Unrecognized metric name; never yields a value
    Other(String),
}

impl MetricKind {
    /// Parse a metric name (case-insensitive)
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cpu" => MetricKind::Cpu,
            "ram" => MetricKind::Ram,
            "disk" => MetricKind::Disk,
            "temp" => MetricKind::Temp,
            other => MetricKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Ram => "ram",
            MetricKind::Disk => "disk",
            MetricKind::Temp => "temp",
            MetricKind::Other(s) => s,
        }
    }

    /// Read the matching field from a sample
    pub fn value_in(&self, sample: &MetricSample) -> Option<f64> {
        match self {
            MetricKind::Cpu => Some(sample.cpu_usage),
            MetricKind::Ram => Some(sample.ram_usage),
            MetricKind::Disk => Some(sample.disk_usage),
            MetricKind::Temp => Some(sample.temperature),
            MetricKind::Other(_) => None,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison between an observed value and a threshold
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operator {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Exact floating-point equality
    Equals,
    /// Unrecognized operator; never matches
    Other(String),
}

impl Operator {
    pub fn parse(s: &str) -> Self {
        match s {
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterOrEqual,
            "<" => Operator::LessThan,
            "<=" => Operator::LessOrEqual,
            "==" => Operator::Equals,
            other => Operator::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equals => "==",
            Operator::Other(s) => s,
        }
    }

    #[allow(clippy::float_cmp)]
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::GreaterThan => value > threshold,
            Operator::GreaterOrEqual => value >= threshold,
            Operator::LessThan => value < threshold,
            Operator::LessOrEqual => value <= threshold,
            Operator::Equals => value == threshold,
            Operator::Other(_) => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(<$ty>::parse(&s))
            }
        }
    };
}

string_serde!(MetricKind);
string_serde!(Operator);

/// Parse a compact duration such as `5m`, `1h30m`, `90s` or `250ms`.
///
/// Accepts the units ns, us (or µs), ms, s, m and h, with optional
/// fractional values per component. Returns `None` for anything else.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s == "0" {
        return Some(Duration::ZERO);
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = s;

    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let multiplier = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total_nanos += value * multiplier;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos as u64))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
