use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchyard_core::error::{Result, SwitchyardError};

pub const DEFAULT_SOURCE_PORT: &str = "out";
pub const DEFAULT_TARGET_PORT: &str = "in";

/// A routine compiled into an action graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDefinition {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges leaving `node_id`, in declaration order.
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source.node == node_id)
    }

    /// Parse a definition from JSON or, for `.toml` files, TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(&content).map_err(|e| SwitchyardError::GraphValidation(e.to_string()))
        } else {
            Ok(serde_json::from_str(&content)?)
        }
    }
}

/// One step of the graph: an action component plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub id: String,
    /// Action type dispatched for this node.
    #[serde(default)]
    pub component: String,
    #[serde(default = "empty_config")]
    pub config: Value,
}

fn empty_config() -> Value {
    Value::Object(Default::default())
}

impl Node {
    pub fn new(id: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component: component.into(),
            config: empty_config(),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// A node and an optional port on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRef {
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl PortRef {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }
}

/// Directed port-to-port connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: PortRef,
    pub target: PortRef,
}

impl Edge {
    /// Connect the default ports of two nodes.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            source: PortRef::new(from),
            target: PortRef::new(to),
        }
    }

    /// Connect explicit ports.
    pub fn ports(
        from: impl Into<String>,
        from_port: impl Into<String>,
        to: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            source: PortRef::new(from).with_port(from_port),
            target: PortRef::new(to).with_port(to_port),
        }
    }

    pub fn source_port(&self) -> &str {
        self.source.port.as_deref().unwrap_or(DEFAULT_SOURCE_PORT)
    }

    pub fn target_port(&self) -> &str {
        self.target.port.as_deref().unwrap_or(DEFAULT_TARGET_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_wire_format_and_port_defaults() {
        let def: GraphDefinition = serde_json::from_value(json!({
            "name": "triage",
            "version": "1",
            "nodes": [
                {"id": "a", "component": "echo"},
                {"id": "b", "component": "wait", "config": {"duration": 5}}
            ],
            "edges": [
                {"source": {"node": "a"}, "target": {"node": "b", "port": "delay"}}
            ]
        }))
        .unwrap();
        assert_eq!(def.nodes[0].config, json!({}));
        assert_eq!(def.edges[0].source_port(), "out");
        assert_eq!(def.edges[0].target_port(), "delay");
        assert_eq!(def.outgoing("a").count(), 1);
        assert_eq!(def.outgoing("b").count(), 0);
    }

    #[test]
    fn test_builder() {
        let def = GraphDefinition::new("g", "2")
            .with_node(Node::new("a", "echo"))
            .with_node(Node::new("b", "echo").with_config(json!({"value": 1})))
            .with_edge(Edge::ports("a", "result", "b", "payload"));
        assert_eq!(def.node("b").unwrap().config, json!({"value": 1}));
        assert_eq!(def.edges[0].source_port(), "result");
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
name = "from-toml"
version = "1"

[[nodes]]
id = "a"
component = "echo"

[[nodes]]
id = "b"
component = "echo"

[[edges]]
source = {{ node = "a" }}
target = {{ node = "b" }}
"#
        )
        .unwrap();
        let def = GraphDefinition::load(file.path()).unwrap();
        assert_eq!(def.name, "from-toml");
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.edges[0].target_port(), "in");
    }
}
