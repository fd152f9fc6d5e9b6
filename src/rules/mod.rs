//! Alert rules: derivation from topology graphs and the live registry

pub mod extractor;
pub mod registry;
pub mod rule;
pub mod trace;

pub use extractor::{extract, extract_graph, ExtractError};
pub use registry::{RuleRegistry, RuleSet};
pub use rule::{parse_duration, AlertRule, MetricKind, Operator, TopologyId};
pub use trace::ExtractionTrace;
