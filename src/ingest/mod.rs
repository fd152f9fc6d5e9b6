//! Metric ingest
//!
//! Every accepted sample is scheduled for alert evaluation on the blocking
//! pool and then written to a [`MetricSink`]. The caller never waits for the
//! evaluation or for any email it triggers.

pub mod sink;

use std::sync::Arc;

use crate::engine::AlertEngine;
use crate::metric::MetricSample;

pub use sink::{LogSink, MetricSink};

pub struct MetricIngest {
    engine: Arc<AlertEngine>,
    sink: Arc<dyn MetricSink>,
}

impl MetricIngest {
    pub fn new(engine: Arc<AlertEngine>, sink: Arc<dyn MetricSink>) -> Self {
        tracing::info!(sink = sink.name(), "Metric ingest ready");
        Self { engine, sink }
    }

    /// Accept one sample.
    ///
    /// Evaluation is scheduled before the sink write, so a failing store does
    /// not hold back alerts.
    pub async fn store_metric(&self, mut sample: MetricSample) -> Result<(), IngestError> {
        if sample.device_name.trim().is_empty() {
            return Err(IngestError::MissingDevice);
        }
        sample.stamp(self.engine.clock().now());

        let engine = Arc::clone(&self.engine);
        let evaluated = sample.clone();
        tokio::task::spawn_blocking(move || {
            let fired = engine.evaluate(&evaluated);
            if !fired.is_empty() {
                tracing::debug!(
                    device = %evaluated.device_name,
                    alerts = fired.len(),
                    "Sample triggered alerts"
                );
            }
        });

        self.sink.write(&sample).await
    }
}

/// Ingest errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("device_name is required")]
    MissingDevice,

    #[error("Metric sink error: {0}")]
    Sink(String),
}
