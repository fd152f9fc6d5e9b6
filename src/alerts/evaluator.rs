//! Threshold evaluation of incoming metric samples

use std::sync::Arc;

use super::cooldown::CooldownGate;
use super::notifier::{Dispatcher, Notification};
use super::recent::{FiredAlert, RecentAlerts};
use crate::clock::Clock;
use crate::metric::MetricSample;
use crate::rules::RuleRegistry;

/// Checks each sample against every active rule for its device
pub struct ThresholdEvaluator {
    registry: Arc<RuleRegistry>,
    gate: Arc<CooldownGate>,
    recent: Arc<RecentAlerts>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
}

impl ThresholdEvaluator {
    pub fn new(
        registry: Arc<RuleRegistry>,
        gate: Arc<CooldownGate>,
        recent: Arc<RecentAlerts>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            gate,
            recent,
            dispatcher,
            clock,
        }
    }

    /// Evaluate one sample and hand any permitted alerts to the dispatcher.
    ///
    /// Works on a registry snapshot, so no lock is held while notifications
    /// are queued. Returns the alerts that passed their cooldown.
    pub fn evaluate(&self, sample: &MetricSample) -> Vec<FiredAlert> {
        let now = self.clock.now();
        let mut fired = Vec::new();

        for (_, rules) in self.registry.snapshot_all() {
            for rule in rules.iter().filter(|r| r.device_id == sample.device_name) {
                let Some(value) = rule.metric.value_in(sample) else {
                    continue;
                };

                if !rule.is_breached_by(value) {
                    continue;
                }

                if !self.gate.try_fire(&rule.id, rule.cooldown, now) {
                    tracing::debug!(
                        rule_id = %rule.id,
                        device = %rule.device_id,
                        "Alert suppressed by cooldown"
                    );
                    continue;
                }

                tracing::info!(
                    rule_id = %rule.id,
                    topology_id = rule.topology_id,
                    device = %rule.device_id,
                    "Triggering alert: {} {} {} (value: {})",
                    rule.metric,
                    rule.operator,
                    rule.threshold,
                    value
                );

                let alert = FiredAlert::new(rule, value, now);
                self.recent.push(alert.clone());
                self.dispatcher
                    .submit(Notification::compose(rule, value, now));
                fired.push(alert);
            }
        }

        fired
    }
}
