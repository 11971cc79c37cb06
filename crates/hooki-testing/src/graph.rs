//! Builders for flow `config` graphs as the editor stores them.

use serde_json::{Value, json};

#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Value>,
    edges: Vec<Value>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.nodes.len() + 1)
    }

    /// Inbound node using the current `path` field.
    pub fn inbound(self, path: &str) -> Self {
        self.inbound_with_ips(path, &[])
    }

    pub fn inbound_with_ips(mut self, path: &str, allowed_ips: &[&str]) -> Self {
        let id = self.next_id("inbound");
        self.nodes.push(json!({
            "id": id,
            "type": "inbound",
            "position": {"x": 0, "y": self.nodes.len() * 100},
            "data": {"path": path, "allowedIps": allowed_ips},
        }));
        self
    }

    /// Inbound node using the legacy `route` field.
    pub fn legacy_inbound(mut self, route: &str) -> Self {
        let id = self.next_id("inbound");
        self.nodes.push(json!({
            "id": id,
            "type": "inbound",
            "data": {"route": route},
        }));
        self
    }

    /// Outbound node, wired from every inbound node added so far.
    pub fn outbound(mut self, url: &str) -> Self {
        let id = self.next_id("outbound");
        let sources: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n["type"] == "inbound")
            .filter_map(|n| n["id"].as_str().map(str::to_owned))
            .collect();
        for source in sources {
            self.edges.push(json!({
                "id": format!("e-{source}-{id}"),
                "source": source,
                "target": id,
            }));
        }
        self.nodes.push(json!({
            "id": id,
            "type": "outbound",
            "position": {"x": 300, "y": self.nodes.len() * 100},
            "data": {"url": url},
        }));
        self
    }

    pub fn hub(mut self) -> Self {
        let id = self.next_id("hub");
        self.nodes.push(json!({"id": id, "type": "router", "data": {}}));
        self
    }

    pub fn build(self) -> Value {
        json!({"nodes": self.nodes, "edges": self.edges})
    }
}
