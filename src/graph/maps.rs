//! Graph map types and builders
//!
//! Defines the core data structures for efficient graph traversal.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::context::OpNode;

/// Type alias for node map: node_name → OpNode (order preserved)
pub type NodeMap = IndexMap<String, OpNode>;

/// Type alias for producer map: output_name → node_name
pub type ProducerMap = FxHashMap<String, String>;

/// Type alias for consumer map: tensor_name → [consumer_node_names]
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<String, SmallVec<[String; 4]>>;

/// Build producer map from graph nodes
///
/// Maps each output tensor name to the node that produces it.
pub fn build_producer_map(nodes: &NodeMap) -> ProducerMap {
    let mut map = FxHashMap::default();

    for node in nodes.values() {
        for output in &node.outputs {
            if !output.is_empty() {
                map.insert(output.clone(), node.name.clone());
            }
        }
    }

    map
}

/// Build consumer map from graph nodes
///
/// Maps each tensor name to the list of nodes that consume it.
pub fn build_consumer_map(nodes: &NodeMap) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();

    for node in nodes.values() {
        for input in &node.inputs {
            if !input.is_empty() {
                let consumers = map.entry(input.clone()).or_default();
                if !consumers.contains(&node.name) {
                    consumers.push(node.name.clone());
                }
            }
        }
    }

    map
}
