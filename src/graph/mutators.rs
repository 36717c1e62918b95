//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding, removing, bypassing and
//! fusing nodes, and re-establishing topological order.

use rustc_hash::FxHashSet;

use crate::error::{FusionError, FusionResult};

use super::context::{Graph, OpNode};

impl Graph {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Insert a new node into the graph
    ///
    /// Updates all relevant maps.
    pub fn insert_node(&mut self, node: OpNode) {
        let name = node.name.clone();

        for output in &node.outputs {
            if !output.is_empty() {
                self.producer_map.insert(output.clone(), name.clone());
            }
        }

        for input in &node.inputs {
            if !input.is_empty() {
                let consumers = self.consumer_map.entry(input.clone()).or_default();
                if !consumers.contains(&name) {
                    consumers.push(name.clone());
                }
            }
        }

        self.nodes.insert(name, node);
    }

    /// Remove a node from the graph, keeping the order of the others
    ///
    /// Does NOT rewire consumers - use [`Graph::bypass_node`] for that.
    pub fn remove_node(&mut self, name: &str) -> Option<OpNode> {
        let node = self.nodes.shift_remove(name)?;

        for output in &node.outputs {
            if self.producer_map.get(output).map(String::as_str) == Some(name) {
                self.producer_map.remove(output);
            }
        }

        for input in &node.inputs {
            if let Some(consumers) = self.consumer_map.get_mut(input) {
                consumers.retain(|n| n != name);
            }
        }

        Some(node)
    }

    /// Remove a single-input node and reconnect its consumers to its input
    pub fn bypass_node(&mut self, name: &str) -> FusionResult<()> {
        let node = self
            .get_node(name)
            .ok_or_else(|| FusionError::NodeNotFound(name.to_string()))?;

        let (Some(input), Some(output)) = (node.inputs.first().cloned(), node.outputs.first().cloned())
        else {
            return Err(FusionError::InvalidGraph(format!(
                "node `{name}` has no input/output to bypass"
            )));
        };

        self.remove_node(name);

        for consumer in self.nodes.values_mut() {
            for tensor in consumer.inputs.iter_mut().filter(|t| **t == output) {
                *tensor = input.clone();
            }
        }
        for graph_output in self.outputs.iter_mut().filter(|t| **t == output) {
            *graph_output = input.clone();
        }

        self.rebuild_maps();
        Ok(())
    }

    /// Replace a group of nodes with one fused node
    ///
    /// The fused node consumes every tensor the group reads from outside and
    /// produces every group output that is used outside the group (or is a
    /// graph output). It takes the position of the earliest member.
    pub fn fuse_nodes(&mut self, members: &[String], fused_name: &str, op_type: &str) -> FusionResult<()> {
        if members.is_empty() {
            return Err(FusionError::InvalidGraph("empty fusion group".to_string()));
        }
        for member in members {
            if !self.has_node(member) {
                return Err(FusionError::NodeNotFound(member.clone()));
            }
        }
        if self.has_node(fused_name) && !members.iter().any(|m| m == fused_name) {
            return Err(FusionError::InvalidGraph(format!(
                "fused node name `{fused_name}` is already taken"
            )));
        }

        let member_set: FxHashSet<&str> = members.iter().map(String::as_str).collect();
        let mut inputs: Vec<String> = Vec::new();
        let mut outputs: Vec<String> = Vec::new();
        let mut position = usize::MAX;

        for (index, node) in self.nodes.values().enumerate() {
            if !member_set.contains(node.name.as_str()) {
                continue;
            }
            position = position.min(index);

            for input in &node.inputs {
                let internal = self
                    .producer_map
                    .get(input)
                    .is_some_and(|p| member_set.contains(p.as_str()));
                if !internal && !inputs.contains(input) {
                    inputs.push(input.clone());
                }
            }

            for output in &node.outputs {
                let used_outside = self.is_graph_output(output)
                    || self
                        .consumer_map
                        .get(output)
                        .is_some_and(|cs| cs.iter().any(|c| !member_set.contains(c.as_str())));
                if used_outside {
                    outputs.push(output.clone());
                }
            }
        }

        for member in members {
            self.nodes.shift_remove(member.as_str());
        }

        let fused = OpNode {
            name: fused_name.to_string(),
            op_type: op_type.to_string(),
            inputs,
            outputs,
        };
        let position = position.min(self.nodes.len());
        self.nodes.shift_insert(position, fused.name.clone(), fused);
        self.rebuild_maps();
        Ok(())
    }

    /// Reorder nodes topologically (Kahn, ties by current order)
    pub fn topological_sort(&mut self) -> FusionResult<()> {
        let order: Vec<String> = self
            .topological_order()
            .into_iter()
            .map(str::to_string)
            .collect();

        if order.len() != self.nodes.len() {
            return Err(FusionError::CycleDetected(self.name.clone()));
        }

        let mut nodes = std::mem::take(&mut self.nodes);
        for name in order {
            if let Some(node) = nodes.shift_remove(&name) {
                self.nodes.insert(name, node);
            }
        }
        Ok(())
    }
}
