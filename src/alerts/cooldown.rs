//! Per-rule notification cooldown
//!
//! The gate records when each rule last fired. The check and the record
//! happen under the same map-entry lock, so two evaluations racing on one
//! rule cannot both pass inside a single window.
//!
//! A firing is recorded when the decision is made, before delivery is
//! attempted. A failed send therefore still consumes the window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Last-fired timestamps keyed by rule id
#[derive(Default)]
pub struct CooldownGate {
    last_fired: DashMap<String, DateTime<Utc>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether `rule_id` may fire at `now` given its own `cooldown`.
    ///
    /// Returns true and records `now` when the rule never fired or at least
    /// `cooldown` has elapsed since it last did. Otherwise leaves the state
    /// untouched and returns false.
    pub fn try_fire(&self, rule_id: &str, cooldown: Duration, now: DateTime<Utc>) -> bool {
        // Out-of-range cooldowns never elapse
        let cooldown = chrono::Duration::from_std(cooldown).ok();

        match self.last_fired.entry(rule_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
            Entry::Occupied(mut slot) => {
                let elapsed = now - *slot.get();
                if cooldown.is_some_and(|c| elapsed >= c) {
                    slot.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn last_fired(&self, rule_id: &str) -> Option<DateTime<Utc>> {
        self.last_fired.get(rule_id).map(|t| *t)
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}
