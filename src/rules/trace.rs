//! Diagnostic trace of rule extraction decisions
//!
//! Keeps the most recent lines in memory so operators can see why an action
//! node did or did not become a rule. Not durable.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};

pub const TRACE_CAPACITY: usize = 100;

/// Bounded ring of `[HH:MM:SS] message` lines
pub struct ExtractionTrace {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl ExtractionTrace {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(TRACE_CAPACITY, clock)
    }

    pub fn with_capacity(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            clock,
        }
    }

    /// Append a line, evicting the oldest once full
    pub fn record(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(target: "fleetwatch::extract", "{}", message);

        let line = format!("[{}] {}", self.clock.now().format("%H:%M:%S"), message);
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the buffered lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExtractionTrace {
    fn default() -> Self {
        Self::new()
    }
}
