//! Compute graph abstraction
//!
//! The pipeline does not own graphs. It only needs what [`ComputeGraph`]
//! exposes: a name for diagnostics, node enumeration, nested subgraphs and a
//! topological sort.
//!
//! [`Graph`] is the crate's reference implementation. It mirrors a front-end
//! graph closely enough to drive the pipeline end to end:
//!
//! | Map | Description |
//! |-----|-------------|
//! | `nodes` | node name → [`OpNode`] (order preserved) |
//! | `producer_map` | output tensor → producer node name |
//! | `consumer_map` | tensor → consumer node names |
//!
//! # Example
//!
//! ```ignore
//! use fusion_scheduler::graph::{Graph, OpNode};
//!
//! let mut graph = Graph::new("main");
//! graph.insert_node(OpNode::new("conv_0", "Conv", &["x", "w"], &["c"]));
//! graph.insert_node(OpNode::new("relu_0", "Relu", &["c"], &["y"]));
//!
//! assert_eq!(graph.successors("conv_0"), vec!["relu_0"]);
//! graph.topological_sort()?;
//! ```

pub mod accessors;
pub mod context;
pub mod cycle;
pub mod maps;
pub mod mutators;

pub use context::{Graph, OpNode};
pub use cycle::ReachabilityCycleCheck;
pub use maps::{ConsumerMap, NodeMap, ProducerMap};

use crate::error::FusionResult;

/// What the pipeline requires of a caller-owned graph
pub trait ComputeGraph {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Names of the nodes of this graph (not of its subgraphs)
    fn node_names(&self) -> Vec<String>;

    /// Directly nested subgraphs
    fn subgraphs(&self) -> Vec<&Self>;

    /// Directly nested subgraphs, mutably
    fn subgraphs_mut(&mut self) -> Vec<&mut Self>;

    /// Reorder nodes topologically; fails on a cycle
    fn topological_sort(&mut self) -> FusionResult<()>;

    /// Copy used to roll back a failed stage; `None` when unsupported
    fn snapshot(&self) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

/// Visit `graph` and then every nested subgraph, depth first
pub fn walk_mut<G, F>(graph: &mut G, f: &mut F) -> FusionResult<()>
where
    G: ComputeGraph,
    F: FnMut(&mut G) -> FusionResult<()>,
{
    f(graph)?;
    for sub in graph.subgraphs_mut() {
        walk_mut(sub, f)?;
    }
    Ok(())
}

/// Count `graph` and all nested subgraphs
pub fn graph_count<G: ComputeGraph>(graph: &G) -> usize {
    1 + graph.subgraphs().into_iter().map(graph_count).sum::<usize>()
}
