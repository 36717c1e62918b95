//! Cycle check for node-group fusion
//!
//! Contracting a group of nodes into one creates a cycle exactly when some
//! path leaves the group and re-enters it through a node outside the group.

use rustc_hash::FxHashSet;

use crate::traits::{CycleCheck, FusionCandidate};

use super::context::Graph;

impl Graph {
    /// Whether fusing `members` into one node would create a cycle
    pub fn fusion_creates_cycle(&self, members: &[String]) -> bool {
        let member_set: FxHashSet<&str> = members.iter().map(String::as_str).collect();
        let mut visited: FxHashSet<&str> = FxHashSet::default();
        let mut stack: Vec<&str> = Vec::new();

        for member in members {
            for succ in self.successors(member) {
                if !member_set.contains(succ) && visited.insert(succ) {
                    stack.push(succ);
                }
            }
        }

        while let Some(name) = stack.pop() {
            for succ in self.successors(name) {
                if member_set.contains(succ) {
                    return true;
                }
                if visited.insert(succ) {
                    stack.push(succ);
                }
            }
        }

        false
    }
}

/// [`CycleCheck`] for [`Graph`] based on reachability
#[derive(Debug, Default, Clone, Copy)]
pub struct ReachabilityCycleCheck;

impl CycleCheck<Graph> for ReachabilityCycleCheck {
    fn would_introduce_cycle(&self, graph: &Graph, candidate: &FusionCandidate) -> bool {
        graph.fusion_creates_cycle(&candidate.nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpNode;

    // a -> b -> c, a -> c
    fn make_diamond() -> Graph {
        Graph::from_nodes(
            "main",
            [
                OpNode::new("a", "Conv", &["x"], &["a_out"]),
                OpNode::new("b", "Relu", &["a_out"], &["b_out"]),
                OpNode::new("c", "Add", &["a_out", "b_out"], &["y"]),
            ],
        )
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_adjacent_pair_is_safe() {
        let graph = make_diamond();
        assert!(!graph.fusion_creates_cycle(&names(&["a", "b"])));
        assert!(!graph.fusion_creates_cycle(&names(&["b", "c"])));
    }

    #[test]
    fn test_skipping_middle_node_creates_cycle() {
        let graph = make_diamond();
        assert!(graph.fusion_creates_cycle(&names(&["a", "c"])));
    }

    #[test]
    fn test_cycle_check_trait() {
        let graph = make_diamond();
        let check = ReachabilityCycleCheck;
        assert!(check.would_introduce_cycle(&graph, &FusionCandidate::new(["a", "c"])));
        assert!(!check.would_introduce_cycle(&graph, &FusionCandidate::new(["a", "b", "c"])));
    }
}
