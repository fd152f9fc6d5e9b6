//! Topology graph nodes and edges
//!
//! The editor stores each node as `{id, type, data}` where `data` is a free
//! attribute bag. Nodes are parsed once into a typed [`NodeData`] view for the
//! kinds the rule engine interprets; everything else is carried as-is.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const ACTION_KIND: &str = "action";
pub const EMAIL_KIND: &str = "email";

/// Node kinds that represent a monitored machine
pub const DEVICE_KINDS: &[&str] = &["device", "monitoring", "router", "notification"];

/// Attribute bag attached to a node
pub type Attributes = Map<String, Value>;

/// A node as stored by the topology editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(rename = "data", default, deserialize_with = "null_as_default")]
    pub attributes: Attributes,
}

/// Directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target: String,
}

/// Treat an explicit `null` like an absent field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            attributes,
        }
    }

    /// Typed view of the node's attributes
    pub fn data(&self) -> NodeData {
        match self.kind.as_str() {
            ACTION_KIND => NodeData::Action(ActionNodeData::from_attributes(&self.attributes)),
            EMAIL_KIND => NodeData::Email(EmailNodeData::from_attributes(&self.attributes)),
            kind if DEVICE_KINDS.contains(&kind) => {
                NodeData::Device(DeviceNodeData::from_attributes(&self.attributes))
            }
            _ => {
                let device = DeviceNodeData::from_attributes(&self.attributes);
                if device.resolve().is_some() {
                    NodeData::Device(device)
                } else {
                    NodeData::Other(self.attributes.clone())
                }
            }
        }
    }

    /// Device name carried by this node, regardless of its kind.
    ///
    /// Tries `label`, then `deviceName`, then `connectedDevice`; the first
    /// non-empty string wins.
    pub fn device_name(&self) -> Option<String> {
        DeviceNodeData::from_attributes(&self.attributes).resolve()
    }
}

/// Typed node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Action(ActionNodeData),
    Email(EmailNodeData),
    Device(DeviceNodeData),
    /// Kinds the rule engine does not interpret
    Other(Attributes),
}

/// Numeric attribute as found in the bag
#[derive(Debug, Clone, PartialEq)]
pub enum NumericAttr {
    Missing,
    Number(f64),
    /// Present but not a JSON number
    Invalid(Value),
}

/// Threshold condition authored on an action node
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNodeData {
    pub metric: Option<String>,
    pub operator: Option<String>,
    pub threshold: NumericAttr,
}

impl ActionNodeData {
    pub fn from_attributes(attrs: &Attributes) -> Self {
        let threshold = match attrs.get("threshold") {
            None | Some(Value::Null) => NumericAttr::Missing,
            Some(v) => match v.as_f64() {
                Some(n) => NumericAttr::Number(n),
                None => NumericAttr::Invalid(v.clone()),
            },
        };

        Self {
            metric: string_attr(attrs, "metric"),
            operator: string_attr(attrs, "operator"),
            threshold,
        }
    }
}

/// Notification target authored on an email node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmailNodeData {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub cooldown: Option<String>,
}

impl EmailNodeData {
    pub fn from_attributes(attrs: &Attributes) -> Self {
        Self {
            to: string_attr(attrs, "to"),
            subject: string_attr(attrs, "subject"),
            body: string_attr(attrs, "body"),
            cooldown: string_attr(attrs, "cooldown"),
        }
    }
}

/// Name-bearing attributes of a device, monitoring or router node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceNodeData {
    pub label: Option<String>,
    pub device_name: Option<String>,
    pub connected_device: Option<String>,
}

impl DeviceNodeData {
    pub fn from_attributes(attrs: &Attributes) -> Self {
        Self {
            label: string_attr(attrs, "label"),
            device_name: string_attr(attrs, "deviceName"),
            connected_device: string_attr(attrs, "connectedDevice"),
        }
    }

    pub fn resolve(&self) -> Option<String> {
        [&self.label, &self.device_name, &self.connected_device]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
            .cloned()
    }
}

/// Non-string values count as absent
fn string_attr(attrs: &Attributes, key: &str) -> Option<String> {
    attrs.get(key).and_then(Value::as_str).map(str::to_string)
}
