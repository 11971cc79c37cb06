//! Flow routing graph stored in `flows.config`.
//!
//! The graph is authored by the visual editor as `{nodes, edges}`. Only node
//! kinds matter for routing; edges are kept for round-tripping but connectivity
//! is advisory, so every inbound and outbound node contributes regardless of
//! how it is wired.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Editor canvas position. Carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Routing role of a node, decoded from its `type` and `data` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Inbound {
        path: String,
        allowed_ips: Vec<String>,
    },
    Outbound {
        url: String,
    },
    /// Any other node type (routers, notes, transforms drawn in the editor).
    Hub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub position: Position,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct GraphError(#[from] serde_json::Error);

#[derive(Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    data: Map<String, Value>,
}

/// First non-empty string among `keys` in a node's `data`.
fn data_str(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| data.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

impl From<RawNode> for FlowNode {
    fn from(raw: RawNode) -> Self {
        // `route` is the legacy field name for both inbound paths and outbound URLs.
        let kind = match raw.kind.as_str() {
            "inbound" => match data_str(&raw.data, &["path", "route"]) {
                Some(path) => NodeKind::Inbound {
                    path,
                    allowed_ips: raw
                        .data
                        .get("allowedIps")
                        .and_then(Value::as_array)
                        .map(|ips| {
                            ips.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_owned)
                                .collect()
                        })
                        .unwrap_or_default(),
                },
                None => NodeKind::Hub,
            },
            "outbound" => match data_str(&raw.data, &["url", "route"]) {
                Some(url) => NodeKind::Outbound { url },
                None => NodeKind::Hub,
            },
            _ => NodeKind::Hub,
        };
        Self {
            id: raw.id,
            position: raw.position,
            kind,
        }
    }
}

impl FlowGraph {
    /// Strictly parse a config value. `null` is an empty graph.
    pub fn parse(value: &Value) -> Result<Self, GraphError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let raw: RawGraph = serde_json::from_value(value.clone())?;
        Ok(Self {
            nodes: raw.nodes.into_iter().map(FlowNode::from).collect(),
            edges: raw.edges,
        })
    }

    /// Parse a stored config, treating anything malformed as an empty graph.
    pub fn from_config(value: Option<&Value>) -> Self {
        value
            .and_then(|v| Self::parse(v).ok())
            .unwrap_or_default()
    }

    /// Inbound paths declared by this flow, in node order.
    pub fn inbound_paths(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Inbound { path, .. } => Some(path.as_str()),
            _ => None,
        })
    }

    /// `(node id, url)` for every outbound node, in node order.
    pub fn outbound_targets(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Outbound { url } => Some((n.id.as_str(), url.as_str())),
            _ => None,
        })
    }

    pub fn declares_path(&self, path: &str) -> bool {
        self.inbound_paths().any(|p| p == path)
    }

    /// Allow-list of the inbound node matching `path`. Empty means unrestricted.
    pub fn allowed_ips(&self, path: &str) -> &[String] {
        self.nodes
            .iter()
            .find_map(|n| match &n.kind {
                NodeKind::Inbound { path: p, allowed_ips } if p == path => {
                    Some(allowed_ips.as_slice())
                }
                _ => None,
            })
            .unwrap_or(&[])
    }
}
