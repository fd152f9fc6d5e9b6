//! Alert engine: owns the rule registry, cooldown state and dispatcher
//!
//! Topology changes come in through [`AlertEngine::apply_topology`] and
//! [`AlertEngine::remove_topology`]; samples through
//! [`AlertEngine::evaluate`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::alerts::{
    CooldownGate, Dispatcher, FiredAlert, LogMailer, Mailer, RecentAlerts, ThresholdEvaluator,
};
use crate::clock::{Clock, SystemClock};
use crate::config::DispatchConfig;
use crate::metric::MetricSample;
use crate::rules::{extract, AlertRule, ExtractError, ExtractionTrace, RuleRegistry, TopologyId};

/// Point-in-time counters for the stats endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub topologies: usize,
    pub rules: usize,
    pub cooldowns: usize,
    pub recent_alerts: usize,
    pub trace_lines: usize,
}

pub struct AlertEngine {
    registry: Arc<RuleRegistry>,
    gate: Arc<CooldownGate>,
    recent: Arc<RecentAlerts>,
    trace: ExtractionTrace,
    dispatcher: Arc<Dispatcher>,
    evaluator: ThresholdEvaluator,
    clock: Arc<dyn Clock>,
}

impl AlertEngine {
    pub fn builder() -> AlertEngineBuilder {
        AlertEngineBuilder::default()
    }

    /// Re-derive a topology's rules and install them atomically.
    ///
    /// On malformed JSON the previous rules stay in place.
    pub fn apply_topology(
        &self,
        topology_id: TopologyId,
        graph_json: &str,
    ) -> Result<usize, ExtractError> {
        let rules = extract(topology_id, graph_json, &self.trace)?;
        let count = rules.len();
        self.registry.replace(topology_id, rules);
        Ok(count)
    }

    /// Disable every rule of a topology
    pub fn remove_topology(&self, topology_id: TopologyId) {
        self.registry.replace(topology_id, Vec::new());
    }

    pub fn evaluate(&self, sample: &MetricSample) -> Vec<FiredAlert> {
        self.evaluator.evaluate(sample)
    }

    /// Active rules of a topology, with their last firing time
    pub fn rules_for(&self, topology_id: TopologyId) -> Vec<AlertRule> {
        self.registry
            .rules_for(topology_id)
            .map(|rules| {
                rules
                    .iter()
                    .map(|rule| AlertRule {
                        last_triggered_at: self.gate.last_fired(&rule.id),
                        ..rule.clone()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn recent_alerts(&self, window: Duration) -> Vec<FiredAlert> {
        self.recent.within(window, self.clock.now())
    }

    pub fn trace_lines(&self) -> Vec<String> {
        self.trace.lines()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            topologies: self.registry.topology_count(),
            rules: self.registry.rule_count(),
            cooldowns: self.gate.len(),
            recent_alerts: self.recent.len(),
            trace_lines: self.trace.len(),
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn cooldowns(&self) -> &CooldownGate {
        &self.gate
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Drain queued notifications and stop the dispatch workers
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

/// Builder for [`AlertEngine`]
#[derive(Default)]
pub struct AlertEngineBuilder {
    clock: Option<Arc<dyn Clock>>,
    mailer: Option<Arc<dyn Mailer>>,
    dispatch: DispatchConfig,
}

impl AlertEngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Start the engine. Spawns dispatch workers, so a tokio runtime is required.
    pub fn build(self) -> AlertEngine {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let mailer = self.mailer.unwrap_or_else(|| Arc::new(LogMailer));

        let registry = Arc::new(RuleRegistry::new());
        let gate = Arc::new(CooldownGate::new());
        let recent = Arc::new(RecentAlerts::new());
        let dispatcher = Arc::new(Dispatcher::start(
            mailer,
            self.dispatch.workers,
            self.dispatch.queue_capacity,
        ));

        let evaluator = ThresholdEvaluator::new(
            Arc::clone(&registry),
            Arc::clone(&gate),
            Arc::clone(&recent),
            Arc::clone(&dispatcher),
            Arc::clone(&clock),
        );

        AlertEngine {
            registry,
            gate,
            recent,
            trace: ExtractionTrace::with_clock(Arc::clone(&clock)),
            dispatcher,
            evaluator,
            clock,
        }
    }
}
