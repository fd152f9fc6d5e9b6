//! fleetwatch: alert rules drawn as topology graphs
//!
//! Operators draw devices, threshold conditions and email outputs as a
//! graph. Every saved graph is turned into [`rules::AlertRule`]s; every
//! metric sample reported by an agent is checked against the rules for its
//! device, and breaches are emailed subject to a per-rule cooldown.
//!
//! # Features
//!
//! - **Rule Extraction**: device → action → email chains become rules, with
//!   defaults for missing attributes and a trace of every decision
//! - **Atomic Rule Sets**: a topology's rules are swapped as a whole
//! - **Per-Rule Cooldown**: repeat alerts are suppressed per rule, safely
//!   under concurrent samples
//! - **Bounded Dispatch**: emails are sent by a worker pool off the ingest path
//!
//! # Example
//!
//! ```no_run
//! use fleetwatch::engine::AlertEngine;
//! use fleetwatch::metric::MetricSample;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = AlertEngine::builder().build();
//!
//! let graph = r#"{
//!     "nodes": [
//!         {"id": "d", "type": "device", "data": {"label": "srv1"}},
//!         {"id": "a", "type": "action", "data": {"metric": "cpu", "operator": ">", "threshold": 90}},
//!         {"id": "e", "type": "email", "data": {"to": "ops@example.com", "cooldown": "10m"}}
//!     ],
//!     "edges": [{"source": "d", "target": "a"}, {"source": "a", "target": "e"}]
//! }"#;
//! engine.apply_topology(1, graph).unwrap();
//!
//! let fired = engine.evaluate(&MetricSample::new("srv1").with_cpu(97.0));
//! println!("Fired: {:?}", fired);
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod graph;
pub mod ingest;
pub mod metric;
pub mod rules;
pub mod topology;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use engine::{AlertEngine, EngineStats};
pub use metric::MetricSample;
pub use rules::{AlertRule, ExtractError};
pub use topology::{TopologyError, TopologyService};
