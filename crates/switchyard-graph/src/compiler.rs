use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use switchyard_core::error::{Result, SwitchyardError};

use crate::definition::{GraphDefinition, Node};

/// Dependency order computed once at load time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Node ids in dependency order.
    pub sorted: Vec<String>,
    /// Longest distance from any input node.
    pub levels: BTreeMap<String, usize>,
    /// Nodes with no incoming edges.
    pub input_nodes: Vec<String>,
    /// Nodes with no outgoing edges.
    pub output_nodes: Vec<String>,
}

/// A compiled graph admitted into the executor. Immutable once built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedGraph {
    pub id: String,
    pub definition: GraphDefinition,
    pub topology: Topology,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedGraph {
    /// Compile `definition` and assign a fresh id.
    pub fn new(definition: GraphDefinition) -> Result<Self> {
        let topology = compile(&definition)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            definition,
            topology,
            loaded_at: Utc::now(),
        })
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.definition.node(id)
    }
}

/// Check required fields, duplicate ids, then edge endpoints, in that order.
pub fn validate(definition: &GraphDefinition) -> Result<()> {
    if definition.name.trim().is_empty() {
        return Err(SwitchyardError::GraphValidation("graph name is required".into()));
    }
    if definition.version.trim().is_empty() {
        return Err(SwitchyardError::GraphValidation("graph version is required".into()));
    }
    if definition.nodes.is_empty() {
        return Err(SwitchyardError::GraphValidation(
            "graph must contain at least one node".into(),
        ));
    }
    for (index, node) in definition.nodes.iter().enumerate() {
        if node.id.trim().is_empty() {
            return Err(SwitchyardError::GraphValidation(format!(
                "node at index {} has no id",
                index
            )));
        }
        if node.component.trim().is_empty() {
            return Err(SwitchyardError::GraphValidation(format!(
                "node '{}' has no component",
                node.id
            )));
        }
    }

    let mut seen = HashSet::with_capacity(definition.nodes.len());
    for node in &definition.nodes {
        if !seen.insert(node.id.as_str()) {
            return Err(SwitchyardError::DuplicateNode(node.id.clone()));
        }
    }

    for edge in &definition.edges {
        if !seen.contains(edge.source.node.as_str()) {
            return Err(SwitchyardError::DanglingEdge {
                node: edge.source.node.clone(),
                end: "source",
            });
        }
        if !seen.contains(edge.target.node.as_str()) {
            return Err(SwitchyardError::DanglingEdge {
                node: edge.target.node.clone(),
                end: "target",
            });
        }
    }
    Ok(())
}

/// Validate and topologically sort a graph definition.
///
/// The work queue is seeded with zero in-degree nodes in declaration order,
/// so independent nodes keep their declared relative order.
pub fn compile(definition: &GraphDefinition) -> Result<Topology> {
    validate(definition)?;

    let nodes = &definition.nodes;
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for edge in &definition.edges {
        // Both ends were checked by validate().
        let from = index[edge.source.node.as_str()];
        let to = index[edge.target.node.as_str()];
        successors[from].push(to);
        in_degree[to] += 1;
    }

    let input_nodes: Vec<String> = (0..nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .map(|i| nodes[i].id.clone())
        .collect();
    let output_nodes: Vec<String> = (0..nodes.len())
        .filter(|&i| successors[i].is_empty())
        .map(|i| nodes[i].id.clone())
        .collect();

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut level = vec![0usize; nodes.len()];
    let mut sorted = Vec::with_capacity(nodes.len());

    while let Some(current) = queue.pop_front() {
        sorted.push(current);
        for &next in &successors[current] {
            level[next] = level[next].max(level[current] + 1);
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if sorted.len() < nodes.len() {
        return Err(SwitchyardError::CycleDetected {
            sorted: sorted.len(),
            total: nodes.len(),
        });
    }

    debug!(
        graph = %definition.name,
        nodes = nodes.len(),
        edges = definition.edges.len(),
        "Graph compiled"
    );

    Ok(Topology {
        levels: sorted
            .iter()
            .map(|&i| (nodes[i].id.clone(), level[i]))
            .collect(),
        sorted: sorted.into_iter().map(|i| nodes[i].id.clone()).collect(),
        input_nodes,
        output_nodes,
    })
}
