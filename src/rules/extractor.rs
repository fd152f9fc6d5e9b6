//! Derive alert rules from a topology graph
//!
//! Every `action` node wired as `input -> action -> email` becomes one
//! [`AlertRule`]. Incomplete wiring drops that single candidate and leaves a
//! note in the [`ExtractionTrace`]; only undecodable JSON is an error.
//!
//! An action node with several inbound or outbound edges uses the first one
//! in edge-list order in each direction and ignores the rest.

use super::rule::{
    parse_duration, AlertRule, MetricKind, Operator, TopologyId, DEFAULT_COOLDOWN,
    DEFAULT_METRIC, DEFAULT_OPERATOR, DEFAULT_THRESHOLD,
};
use super::trace::ExtractionTrace;
use crate::graph::{ActionNodeData, EmailNodeData, Graph, GraphNode, NodeData, NumericAttr};

/// Decode `graph_json` and extract its rules
pub fn extract(
    topology_id: TopologyId,
    graph_json: &str,
    trace: &ExtractionTrace,
) -> Result<Vec<AlertRule>, ExtractError> {
    let graph = Graph::parse(graph_json).map_err(|e| {
        trace.record(format!("Topology {}: graph is not valid JSON: {}", topology_id, e));
        ExtractError::MalformedGraph(e)
    })?;

    Ok(extract_graph(topology_id, &graph, trace))
}

/// Extract rules from an already decoded graph, in action-node order
pub fn extract_graph(
    topology_id: TopologyId,
    graph: &Graph,
    trace: &ExtractionTrace,
) -> Vec<AlertRule> {
    let index = graph.node_index();

    trace.record(format!(
        "Processing topology {}. Nodes: {}, Edges: {}",
        topology_id,
        graph.nodes.len(),
        graph.edges.len()
    ));

    let mut rules = Vec::new();

    for action in &graph.nodes {
        let NodeData::Action(condition) = action.data() else {
            continue;
        };
        trace.record(format!("Found action node: {}", action.id));

        let input_id = graph.first_source_of(&action.id);
        let output_id = graph.first_target_of(&action.id);

        let (input_id, output_id) = match (input_id, output_id) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                trace.record(format!(
                    "Skipping action {}: missing input or output connection (input: {:?}, output: {:?})",
                    action.id, input_id, output_id
                ));
                continue;
            }
        };

        let input = index.get(input_id).copied();
        let output = index.get(output_id).copied();

        let (input, email, target) = match (input, output, output.map(GraphNode::data)) {
            (Some(i), Some(o), Some(NodeData::Email(target))) => (i, o, target),
            _ => {
                trace.record(format!(
                    "Skipping action {}: invalid endpoints (input found: {}, output found: {}, output kind: {})",
                    action.id,
                    input.is_some(),
                    output.is_some(),
                    output.map(|o| o.kind.as_str()).unwrap_or("-")
                ));
                continue;
            }
        };

        if let Some(rule) = build_rule(topology_id, action, condition, input, email, target, trace)
        {
            rules.push(rule);
        }
    }

    trace.record(format!(
        "Topology {}: {} rule(s) extracted",
        topology_id,
        rules.len()
    ));

    rules
}

fn build_rule(
    topology_id: TopologyId,
    action: &GraphNode,
    condition: ActionNodeData,
    input: &GraphNode,
    email: &GraphNode,
    target: EmailNodeData,
    trace: &ExtractionTrace,
) -> Option<AlertRule> {
    let device_name = match input.data() {
        NodeData::Device(device) => device.resolve(),
        // action and email nodes can still carry a device name
        _ => input.device_name(),
    };

    let device_id = match device_name {
        Some(name) => name,
        None => {
            trace.record(format!(
                "Skipping action {}: device name is empty for node {}",
                action.id, input.id
            ));
            return None;
        }
    };

    let metric = condition
        .metric
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_METRIC.to_string());
    let operator = condition
        .operator
        .filter(|op| !op.is_empty())
        .unwrap_or_else(|| DEFAULT_OPERATOR.to_string());

    let threshold = match condition.threshold {
        NumericAttr::Number(n) => n,
        NumericAttr::Missing => DEFAULT_THRESHOLD,
        NumericAttr::Invalid(raw) => {
            trace.record(format!(
                "Action {}: threshold {} is not numeric, using {}",
                action.id, raw, DEFAULT_THRESHOLD
            ));
            DEFAULT_THRESHOLD
        }
    };

    let notify_to = target.to.unwrap_or_default();
    if notify_to.is_empty() {
        trace.record(format!(
            "Skipping action {}: email node {} has no recipient",
            action.id, email.id
        ));
        return None;
    }

    let cooldown = match target.cooldown.as_deref().filter(|c| !c.is_empty()) {
        None => DEFAULT_COOLDOWN,
        Some(raw) => parse_duration(raw).unwrap_or_else(|| {
            trace.record(format!(
                "Action {}: cooldown {:?} is not a duration, using 1h",
                action.id, raw
            ));
            DEFAULT_COOLDOWN
        }),
    };

    let rule = AlertRule {
        id: action.id.clone(),
        topology_id,
        device_id,
        metric: MetricKind::parse(&metric),
        operator: Operator::parse(&operator),
        threshold,
        notify_to,
        notify_subject: target.subject.unwrap_or_default(),
        notify_body: target.body.unwrap_or_default(),
        cooldown,
        last_triggered_at: None,
    };

    trace.record(format!(
        "Extracted rule {}: device={} {} {} {} -> {}",
        rule.id, rule.device_id, rule.metric, rule.operator, rule.threshold, rule.notify_to
    ));

    Some(rule)
}

/// Rule extraction errors
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Malformed topology graph: {0}")]
    MalformedGraph(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn single_action_graph(action: serde_json::Value, email: serde_json::Value) -> String {
        json!({
            "nodes": [
                {"id": "dev", "type": "device", "data": {"label": "srv1"}},
                {"id": "act", "type": "action", "data": action},
                {"id": "mail", "type": "email", "data": email}
            ],
            "edges": [
                {"source": "dev", "target": "act"},
                {"source": "act", "target": "mail"}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_single_rule_with_fields() {
        let trace = ExtractionTrace::new();
        let graph = single_action_graph(
            json!({"metric": "cpu", "operator": ">=", "threshold": 70}),
            json!({"to": "ops@x.com", "subject": "High CPU", "body": "check it", "cooldown": "5m"}),
        );

        let rules = assert_ok!(extract(7, &graph, &trace));
        assert_eq!(rules.len(), 1);

        let rule = &rules[0];
        assert_eq!(rule.id, "act");
        assert_eq!(rule.topology_id, 7);
        assert_eq!(rule.device_id, "srv1");
        assert_eq!(rule.metric, MetricKind::Cpu);
        assert_eq!(rule.operator, Operator::GreaterOrEqual);
        assert_eq!(rule.threshold, 70.0);
        assert_eq!(rule.notify_to, "ops@x.com");
        assert_eq!(rule.notify_subject, "High CPU");
        assert_eq!(rule.notify_body, "check it");
        assert_eq!(rule.cooldown, Duration::from_secs(300));
        assert_eq!(rule.last_triggered_at, None);
    }

    #[test]
    fn test_null_and_missing_fields_tolerated() {
        let trace = ExtractionTrace::new();
        let graph = json!({
            "nodes": [
                {"id": "note", "type": "group", "data": null},
                {"type": null, "data": {"text": "unnamed"}},
                {"id": "dev", "type": "device", "data": {"label": "srv1"}},
                {"id": "act", "type": "action", "data": {"threshold": 90}},
                {"id": "mail", "type": "email", "data": {"to": "ops@x.com", "subject": null}}
            ],
            "edges": [
                {"source": "dev", "target": "act"},
                {"source": "act", "target": "mail"}
            ]
        });

        let rules = assert_ok!(extract(1, &graph.to_string(), &trace));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].notify_subject, "");

        let empty = assert_ok!(extract(2, r#"{"nodes": null, "edges": null}"#, &trace));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_defaults_applied() {
        let trace = ExtractionTrace::new();
        let graph = single_action_graph(json!({}), json!({"to": "ops@x.com"}));

        let rules = extract(1, &graph, &trace).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].metric, MetricKind::Cpu);
        assert_eq!(rules[0].operator, Operator::GreaterOrEqual);
        assert_eq!(rules[0].threshold, DEFAULT_THRESHOLD);
        assert_eq!(rules[0].cooldown, DEFAULT_COOLDOWN);
        assert_eq!(rules[0].notify_subject, "");
    }

    #[test]
    fn test_metric_lowercased_and_bad_values_defaulted() {
        let trace = ExtractionTrace::new();
        let graph = single_action_graph(
            json!({"metric": "RAM", "operator": "<", "threshold": "ninety"}),
            json!({"to": "ops@x.com", "cooldown": "whenever"}),
        );

        let rules = extract(1, &graph, &trace).unwrap();
        assert_eq!(rules[0].metric, MetricKind::Ram);
        assert_eq!(rules[0].operator, Operator::LessThan);
        assert_eq!(rules[0].threshold, 70.0);
        assert_eq!(rules[0].cooldown, DEFAULT_COOLDOWN);
        assert!(trace.lines().iter().any(|l| l.contains("not numeric")));
    }

    #[test]
    fn test_empty_recipient_skipped() {
        let trace = ExtractionTrace::new();
        let graph = single_action_graph(json!({"threshold": 50}), json!({"to": ""}));

        let rules = extract(1, &graph, &trace).unwrap();
        assert!(rules.is_empty());
        assert!(trace.lines().iter().any(|l| l.contains("no recipient")));
    }

    #[test]
    fn test_missing_edges_do_not_affect_siblings() {
        let trace = ExtractionTrace::new();
        let graph = json!({
            "nodes": [
                {"id": "dev", "type": "device", "data": {"deviceName": "srv1"}},
                {"id": "orphan", "type": "action", "data": {"threshold": 10}},
                {"id": "no-out", "type": "action", "data": {"threshold": 20}},
                {"id": "good", "type": "action", "data": {"threshold": 30}},
                {"id": "mail", "type": "email", "data": {"to": "ops@x.com"}}
            ],
            "edges": [
                {"source": "dev", "target": "no-out"},
                {"source": "dev", "target": "good"},
                {"source": "good", "target": "mail"}
            ]
        })
        .to_string();

        let rules = extract(1, &graph, &trace).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "good");
        assert_eq!(rules[0].device_id, "srv1");
        assert_eq!(rules[0].threshold, 30.0);
    }

    #[test]
    fn test_output_must_be_email() {
        let trace = ExtractionTrace::new();
        let graph = json!({
            "nodes": [
                {"id": "dev", "type": "device", "data": {"label": "srv1"}},
                {"id": "act", "type": "action", "data": {}},
                {"id": "mon", "type": "monitoring", "data": {"to": "ops@x.com"}}
            ],
            "edges": [
                {"source": "dev", "target": "act"},
                {"source": "act", "target": "mon"}
            ]
        })
        .to_string();

        assert!(extract(1, &graph, &trace).unwrap().is_empty());
    }

    #[test]
    fn test_dangling_edge_skipped() {
        let trace = ExtractionTrace::new();
        let graph = json!({
            "nodes": [
                {"id": "act", "type": "action", "data": {}},
                {"id": "mail", "type": "email", "data": {"to": "ops@x.com"}}
            ],
            "edges": [
                {"source": "ghost", "target": "act"},
                {"source": "act", "target": "mail"}
            ]
        })
        .to_string();

        assert!(extract(1, &graph, &trace).unwrap().is_empty());
    }

    #[test]
    fn test_device_without_name_skipped() {
        let trace = ExtractionTrace::new();
        let graph = json!({
            "nodes": [
                {"id": "dev", "type": "device", "data": {"ip": "10.0.0.1"}},
                {"id": "act", "type": "action", "data": {}},
                {"id": "mail", "type": "email", "data": {"to": "ops@x.com"}}
            ],
            "edges": [
                {"source": "dev", "target": "act"},
                {"source": "act", "target": "mail"}
            ]
        })
        .to_string();

        assert!(extract(1, &graph, &trace).unwrap().is_empty());
    }

    #[test]
    fn test_first_edge_used_for_multi_wired_action() {
        let trace = ExtractionTrace::new();
        let graph = json!({
            "nodes": [
                {"id": "d1", "type": "device", "data": {"label": "first"}},
                {"id": "d2", "type": "device", "data": {"label": "second"}},
                {"id": "act", "type": "action", "data": {}},
                {"id": "m1", "type": "email", "data": {"to": "a@x.com"}},
                {"id": "m2", "type": "email", "data": {"to": "b@x.com"}}
            ],
            "edges": [
                {"source": "d1", "target": "act"},
                {"source": "d2", "target": "act"},
                {"source": "act", "target": "m1"},
                {"source": "act", "target": "m2"}
            ]
        })
        .to_string();

        let rules = extract(1, &graph, &trace).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].device_id, "first");
        assert_eq!(rules[0].notify_to, "a@x.com");
    }

    #[test]
    fn test_rules_follow_node_order() {
        let trace = ExtractionTrace::new();
        let graph = json!({
            "nodes": [
                {"id": "z", "type": "action", "data": {"metric": "disk"}},
                {"id": "dev", "type": "monitoring", "data": {"connectedDevice": "srv2"}},
                {"id": "a", "type": "action", "data": {"metric": "temp"}},
                {"id": "mail", "type": "email", "data": {"to": "ops@x.com"}}
            ],
            "edges": [
                {"source": "dev", "target": "a"},
                {"source": "a", "target": "mail"},
                {"source": "dev", "target": "z"},
                {"source": "z", "target": "mail"}
            ]
        })
        .to_string();

        let ids: Vec<String> = extract(1, &graph, &trace)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["z".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_malformed_json_is_error() {
        let trace = ExtractionTrace::new();
        let err = assert_err!(extract(1, "{\"nodes\": [", &trace));
        assert!(matches!(err, ExtractError::MalformedGraph(_)));

        assert_err!(extract(1, "{\"nodes\": 5}", &trace));
    }
}
