//! Metric samples reported by collection agents

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample from an agent, as sent on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Device the sample belongs to; matched against rule device ids
    pub device_name: String,
    #[serde(default)]
    pub ip_address: String,
    /// Filled in on receipt when the agent omits it
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub cpu_usage: f64,
    #[serde(default)]
    pub ram_usage: f64,
    #[serde(default)]
    pub disk_usage: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpu_per_core: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_rx_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_tx_bytes: Option<u64>,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_procs: Vec<String>,
}

impl MetricSample {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            ..Default::default()
        }
    }

    pub fn with_cpu(mut self, cpu: f64) -> Self {
        self.cpu_usage = cpu;
        self
    }

    pub fn with_ram(mut self, ram: f64) -> Self {
        self.ram_usage = ram;
        self
    }

    pub fn with_disk(mut self, disk: f64) -> Self {
        self.disk_usage = disk;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Stamp the sample with `now` unless the agent already did
    pub fn stamp(&mut self, now: DateTime<Utc>) {
        if self.timestamp.is_none() {
            self.timestamp = Some(now);
        }
    }
}
