//! Rule sets keyed by topology
//!
//! Each topology's rules live behind an `Arc<[AlertRule]>` that is swapped as
//! a whole on [`RuleRegistry::replace`]. Readers clone the `Arc`s and release
//! the lock, so evaluation never observes a half-written set and a writer
//! never mutates a set that is already handed out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::rule::{AlertRule, TopologyId};

/// Immutable rule set of one topology
pub type RuleSet = Arc<[AlertRule]>;

/// Concurrency-safe registry of active rules
#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<HashMap<TopologyId, RuleSet>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rule set of a topology.
    ///
    /// An empty list removes the topology's rules entirely.
    pub fn replace(&self, topology_id: TopologyId, rules: Vec<AlertRule>) {
        let count = rules.len();
        {
            let mut map = self.rules.write();
            if rules.is_empty() {
                map.remove(&topology_id);
            } else {
                map.insert(topology_id, Arc::from(rules));
            }
        }

        tracing::info!(
            topology_id,
            rules = count,
            "Updated rules for topology"
        );
    }

    /// Point-in-time view of every topology's rules
    pub fn snapshot_all(&self) -> Vec<(TopologyId, RuleSet)> {
        let map = self.rules.read();
        map.iter()
            .map(|(id, rules)| (*id, Arc::clone(rules)))
            .collect()
    }

    /// Rules of a single topology
    pub fn rules_for(&self, topology_id: TopologyId) -> Option<RuleSet> {
        self.rules.read().get(&topology_id).cloned()
    }

    pub fn topology_count(&self) -> usize {
        self.rules.read().len()
    }

    /// Total number of active rules across topologies
    pub fn rule_count(&self) -> usize {
        self.rules.read().values().map(|r| r.len()).sum()
    }
}
