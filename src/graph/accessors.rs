//! Graph traversal accessors
//!
//! Read-only queries over a [`Graph`]: producers, consumers, node-level
//! neighbours and a deterministic topological order.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use super::context::{Graph, OpNode};

impl Graph {
    /// Get the producer node for a tensor
    pub fn get_producer(&self, tensor_name: &str) -> Option<&OpNode> {
        self.producer_map
            .get(tensor_name)
            .and_then(|name| self.get_node(name))
    }

    /// Get consumer nodes for a tensor
    pub fn get_consumers(&self, tensor_name: &str) -> Vec<&OpNode> {
        self.consumer_map
            .get(tensor_name)
            .map(|names| names.iter().filter_map(|name| self.get_node(name)).collect())
            .unwrap_or_default()
    }

    /// Find all nodes with the given op type
    pub fn find_nodes_by_op(&self, op_type: &str) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.op_type == op_type)
            .map(|n| n.name.clone())
            .collect()
    }

    /// Distinct nodes producing inputs of `name`
    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        let Some(node) = self.get_node(name) else {
            return Vec::new();
        };

        let mut seen = FxHashSet::default();
        let mut result = Vec::new();
        for input in &node.inputs {
            if let Some(producer) = self.producer_map.get(input) {
                if seen.insert(producer.as_str()) {
                    result.push(producer.as_str());
                }
            }
        }
        result
    }

    /// Distinct nodes consuming outputs of `name`
    pub fn successors(&self, name: &str) -> Vec<&str> {
        let Some(node) = self.get_node(name) else {
            return Vec::new();
        };

        let mut seen = FxHashSet::default();
        let mut result = Vec::new();
        for output in &node.outputs {
            if let Some(consumers) = self.consumer_map.get(output) {
                for consumer in consumers {
                    if seen.insert(consumer.as_str()) {
                        result.push(consumer.as_str());
                    }
                }
            }
        }
        result
    }

    /// Check if a tensor is a graph output
    pub fn is_graph_output(&self, tensor_name: &str) -> bool {
        self.outputs.iter().any(|o| o == tensor_name)
    }

    /// Get the topological order of nodes (using Kahn's algorithm)
    ///
    /// Ties are broken by current node order. Nodes on a cycle are missing
    /// from the result.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut in_degree: FxHashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), self.predecessors(name).len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .nodes
            .keys()
            .map(String::as_str)
            .filter(|name| in_degree.get(name) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(name) = queue.pop_front() {
            result.push(name);
            for succ in self.successors(name) {
                if let Some(count) = in_degree.get_mut(succ) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }

        result
    }

    /// Whether the current node order is already topological
    pub fn is_topologically_sorted(&self) -> bool {
        let position: FxHashMap<&str, usize> = self
            .nodes
            .keys()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        self.nodes.keys().all(|name| {
            self.predecessors(name)
                .iter()
                .all(|pred| position.get(pred) < position.get(name.as_str()))
        })
    }
}
