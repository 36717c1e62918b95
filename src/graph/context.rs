//! Reference compute graph
//!
//! `Graph` keeps its nodes in insertion order and maintains producer and
//! consumer maps for O(1) traversal, the way a front-end graph would.

use crate::error::FusionResult;

use super::maps::{build_consumer_map, build_producer_map, ConsumerMap, NodeMap, ProducerMap};
use super::ComputeGraph;

/// One operator node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpNode {
    /// Node name, unique within its graph
    pub name: String,
    /// Operator type
    pub op_type: String,
    /// Input tensor names
    pub inputs: Vec<String>,
    /// Output tensor names
    pub outputs: Vec<String>,
}

impl OpNode {
    /// Create a node
    pub fn new(name: &str, op_type: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            op_type: op_type.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Graph with nested subgraphs
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Graph name
    pub name: String,

    /// Maps node name → OpNode (preserves order)
    pub nodes: NodeMap,

    /// Maps output tensor name → producer node name
    pub producer_map: ProducerMap,

    /// Maps tensor name → consumer node names
    pub consumer_map: ConsumerMap,

    /// Graph input tensors
    pub inputs: Vec<String>,

    /// Graph output tensors
    pub outputs: Vec<String>,

    /// Nested subgraphs (control-flow bodies, partitions)
    pub subgraphs: Vec<Graph>,
}

impl Graph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create a graph from nodes
    pub fn from_nodes(name: impl Into<String>, nodes: impl IntoIterator<Item = OpNode>) -> Self {
        let mut graph = Self::new(name);
        for node in nodes {
            graph.nodes.insert(node.name.clone(), node);
        }
        graph.rebuild_maps();
        graph
    }

    /// Set graph inputs
    pub fn with_inputs(mut self, inputs: &[&str]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set graph outputs
    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Attach a nested subgraph
    pub fn with_subgraph(mut self, sub: Graph) -> Self {
        self.subgraphs.push(sub);
        self
    }

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rebuild producer and consumer maps from the node map
    pub fn rebuild_maps(&mut self) {
        self.producer_map = build_producer_map(&self.nodes);
        self.consumer_map = build_consumer_map(&self.nodes);
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by name
    pub fn get_node(&self, name: &str) -> Option<&OpNode> {
        self.nodes.get(name)
    }

    /// Check if a node exists
    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all nodes in order
    pub fn iter_nodes(&self) -> impl Iterator<Item = &OpNode> {
        self.nodes.values()
    }

    /// Node names in current order
    pub fn ordered_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    /// Find a subgraph (at any depth) by name
    pub fn find_subgraph(&self, name: &str) -> Option<&Graph> {
        self.subgraphs.iter().find_map(|sub| {
            if sub.name == name {
                Some(sub)
            } else {
                sub.find_subgraph(name)
            }
        })
    }
}

impl ComputeGraph for Graph {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    fn subgraphs(&self) -> Vec<&Self> {
        self.subgraphs.iter().collect()
    }

    fn subgraphs_mut(&mut self) -> Vec<&mut Self> {
        self.subgraphs.iter_mut().collect()
    }

    fn topological_sort(&mut self) -> FusionResult<()> {
        Graph::topological_sort(self)
    }

    fn snapshot(&self) -> Option<Self> {
        Some(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_graph() -> Graph {
        Graph::from_nodes(
            "main",
            [
                OpNode::new("conv_0", "Conv", &["X", "W"], &["conv_out"]),
                OpNode::new("relu_0", "Relu", &["conv_out"], &["Y"]),
            ],
        )
        .with_inputs(&["X"])
        .with_outputs(&["Y"])
        .with_subgraph(Graph::new("body").with_subgraph(Graph::new("inner")))
    }

    #[test]
    fn test_context_creation() {
        let graph = make_test_graph();

        assert_eq!(graph.node_count(), 2);
        assert!(graph.has_node("conv_0"));
        assert_eq!(graph.producer_map.get("conv_out"), Some(&"conv_0".to_string()));
        assert_eq!(graph.ordered_names(), vec!["conv_0", "relu_0"]);
    }

    #[test]
    fn test_find_subgraph() {
        let graph = make_test_graph();
        assert!(graph.find_subgraph("inner").is_some());
        assert!(graph.find_subgraph("missing").is_none());
        assert_eq!(super::super::graph_count(&graph), 3);
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let graph = make_test_graph();
        let snap = ComputeGraph::snapshot(&graph).unwrap();
        assert_eq!(snap.node_count(), 2);
        assert_eq!(snap.subgraphs.len(), 1);
    }
}
