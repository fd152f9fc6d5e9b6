//! Downstream storage for accepted samples

use async_trait::async_trait;

use super::IngestError;
use crate::metric::MetricSample;

/// Where accepted samples are written after alert evaluation is scheduled
#[async_trait]
pub trait MetricSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn write(&self, sample: &MetricSample) -> Result<(), IngestError>;
}

/// Sink that only logs; used when no time-series store is attached
pub struct LogSink;

#[async_trait]
impl MetricSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn write(&self, sample: &MetricSample) -> Result<(), IngestError> {
        tracing::debug!(
            device = %sample.device_name,
            cpu = sample.cpu_usage,
            ram = sample.ram_usage,
            disk = sample.disk_usage,
            temperature = sample.temperature,
            "Metric sample stored"
        );
        Ok(())
    }
}

/// Sink that keeps every sample in memory
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySink {
    pub samples: parking_lot::Mutex<Vec<MetricSample>>,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl MetricSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, sample: &MetricSample) -> Result<(), IngestError> {
        if self.fail {
            return Err(IngestError::Sink("store unavailable".to_string()));
        }
        self.samples.lock().push(sample.clone());
        Ok(())
    }
}
