//! Feed of recently triggered alerts
//!
//! The dashboard polls this with a short window to raise toast
//! notifications; it is bounded and in-memory only.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::rules::{AlertRule, MetricKind, Operator, TopologyId};

pub const RECENT_CAPACITY: usize = 200;
pub const DEFAULT_RECENT_WINDOW: Duration = Duration::from_secs(10);

/// An alert that passed its cooldown and was handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredAlert {
    pub rule_id: String,
    pub topology_id: TopologyId,
    pub device_id: String,
    pub metric: MetricKind,
    pub operator: Operator,
    pub threshold: f64,
    pub value: f64,
    pub notify_to: String,
    pub subject: String,
    pub fired_at: DateTime<Utc>,
}

impl FiredAlert {
    pub fn new(rule: &AlertRule, value: f64, fired_at: DateTime<Utc>) -> Self {
        Self {
            rule_id: rule.id.clone(),
            topology_id: rule.topology_id,
            device_id: rule.device_id.clone(),
            metric: rule.metric.clone(),
            operator: rule.operator.clone(),
            threshold: rule.threshold,
            value,
            notify_to: rule.notify_to.clone(),
            subject: rule.notify_subject.clone(),
            fired_at,
        }
    }
}

/// Bounded ring of fired alerts, oldest first
pub struct RecentAlerts {
    alerts: Mutex<VecDeque<FiredAlert>>,
    capacity: usize,
}

impl RecentAlerts {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, alert: FiredAlert) {
        let mut alerts = self.alerts.lock();
        if alerts.len() == self.capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }

    /// Alerts fired within `window` before `now`, most recently pushed first.
    ///
    /// Concurrent evaluations may push slightly out of timestamp order, so
    /// the whole ring is scanned. A window reaching past the representable
    /// range returns everything.
    pub fn within(&self, window: Duration, now: DateTime<Utc>) -> Vec<FiredAlert> {
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        self.alerts
            .lock()
            .iter()
            .rev()
            .filter(|a| a.fired_at >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecentAlerts {
    fn default() -> Self {
        Self::new()
    }
}
