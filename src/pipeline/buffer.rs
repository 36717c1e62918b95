//! Candidate screening for buffer fusion rules
//!
//! A rule proposes candidates on the unmodified graph. The cycle check runs
//! over all of them first (in parallel above a size threshold). The survivors
//! are then fused one by one on the calling thread, re-checked against the
//! graph as it has been mutated so far and rejected if they overlap a group
//! that was already fused.

use std::fmt;

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::error::FusionResult;
use crate::graph::ComputeGraph;
use crate::traits::{BufferFusionPass, CycleCheck, FusionCandidate};

/// Why a candidate was not fused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Fusing would introduce a cycle
    Cycle,
    /// A member was already fused by an earlier candidate
    Overlap,
    /// The candidate has no members
    Empty,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Cycle => f.write_str("cycle"),
            RejectReason::Overlap => f.write_str("overlap"),
            RejectReason::Empty => f.write_str("empty"),
        }
    }
}

/// Result of running one rule on one graph
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferOutcome {
    /// Number of fused candidates
    pub fused: usize,
    /// Rejected candidates with the reason
    pub rejected: Vec<(FusionCandidate, RejectReason)>,
}

/// Match, screen and fuse the candidates of one rule on one graph
pub fn fuse_candidates<G>(
    graph: &mut G,
    rule: &dyn BufferFusionPass<G>,
    check: &dyn CycleCheck<G>,
    parallel_threshold: usize,
) -> FusionResult<BufferOutcome>
where
    G: ComputeGraph + Sync,
{
    let candidates = rule.match_candidates(graph)?;
    let mut outcome = BufferOutcome::default();
    if candidates.is_empty() {
        return Ok(outcome);
    }

    let view: &G = graph;
    let introduces_cycle: Vec<bool> = if candidates.len() >= parallel_threshold {
        candidates
            .par_iter()
            .map(|c| check.would_introduce_cycle(view, c))
            .collect()
    } else {
        candidates
            .iter()
            .map(|c| check.would_introduce_cycle(view, c))
            .collect()
    };

    let mut claimed: FxHashSet<String> = FxHashSet::default();
    for (candidate, cyclic) in candidates.into_iter().zip(introduces_cycle) {
        let reason = if candidate.nodes.is_empty() {
            Some(RejectReason::Empty)
        } else if cyclic {
            Some(RejectReason::Cycle)
        } else if candidate.nodes.iter().any(|n| claimed.contains(n)) {
            Some(RejectReason::Overlap)
        } else if outcome.fused > 0 && check.would_introduce_cycle(graph, &candidate) {
            Some(RejectReason::Cycle)
        } else {
            None
        };

        if let Some(reason) = reason {
            debug!(graph = graph.name(), nodes = ?candidate.nodes, %reason, "rejected fusion candidate");
            outcome.rejected.push((candidate, reason));
            continue;
        }

        rule.fuse(graph, &candidate)?;
        claimed.extend(candidate.nodes);
        outcome.fused += 1;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, OpNode, ReachabilityCycleCheck};

    /// Proposes fixed groups and fuses them with `Graph::fuse_nodes`
    struct FixedGroups(Vec<Vec<&'static str>>);

    impl BufferFusionPass<Graph> for FixedGroups {
        fn match_candidates(&self, _graph: &Graph) -> FusionResult<Vec<FusionCandidate>> {
            Ok(self.0.iter().map(|g| FusionCandidate::new(g.iter().copied())).collect())
        }

        fn fuse(&self, graph: &mut Graph, candidate: &FusionCandidate) -> FusionResult<()> {
            let fused_name = candidate.nodes.join("+");
            graph.fuse_nodes(&candidate.nodes, &fused_name, "Fused")
        }
    }

    // a -> b -> c, a -> c, c -> d
    fn make_graph() -> Graph {
        Graph::from_nodes(
            "main",
            [
                OpNode::new("a", "Conv", &["x"], &["t_a"]),
                OpNode::new("b", "Relu", &["t_a"], &["t_b"]),
                OpNode::new("c", "Add", &["t_a", "t_b"], &["t_c"]),
                OpNode::new("d", "Relu", &["t_c"], &["y"]),
            ],
        )
        .with_inputs(&["x"])
        .with_outputs(&["y"])
    }

    #[test]
    fn test_cycle_candidate_rejected() {
        let mut graph = make_graph();
        let rule = FixedGroups(vec![vec!["a", "c"], vec!["c", "d"]]);

        let outcome = fuse_candidates(&mut graph, &rule, &ReachabilityCycleCheck, 64).unwrap();
        assert_eq!(outcome.fused, 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].1, RejectReason::Cycle);
        assert!(graph.has_node("c+d"));
        assert!(graph.has_node("a"));
    }

    #[test]
    fn test_overlap_rejected() {
        let mut graph = make_graph();
        let rule = FixedGroups(vec![vec!["a", "b"], vec!["b", "c"], vec![]]);

        let outcome = fuse_candidates(&mut graph, &rule, &ReachabilityCycleCheck, 64).unwrap();
        assert_eq!(outcome.fused, 1);
        let reasons: Vec<RejectReason> = outcome.rejected.iter().map(|(_, r)| *r).collect();
        assert_eq!(reasons, vec![RejectReason::Overlap, RejectReason::Empty]);
    }

    #[test]
    fn test_parallel_prescreen_matches_sequential() {
        let rule = FixedGroups(vec![vec!["a", "c"], vec!["b", "c"], vec!["c", "d"]]);

        let mut sequential = make_graph();
        let seq = fuse_candidates(&mut sequential, &rule, &ReachabilityCycleCheck, usize::MAX).unwrap();
        let mut parallel = make_graph();
        let par = fuse_candidates(&mut parallel, &rule, &ReachabilityCycleCheck, 0).unwrap();

        assert_eq!(seq, par);
        assert_eq!(sequential.ordered_names(), parallel.ordered_names());
    }

    #[test]
    fn test_recheck_after_mutation() {
        // a -> p and q -> d are unrelated until {p, q} is fused
        let mut graph = Graph::from_nodes(
            "main",
            [
                OpNode::new("a", "Conv", &["x"], &["t_a"]),
                OpNode::new("p", "Relu", &["t_a"], &["y1"]),
                OpNode::new("q", "Relu", &["z"], &["t_q"]),
                OpNode::new("d", "Add", &["t_q"], &["y"]),
            ],
        )
        .with_outputs(&["y", "y1"]);
        let rule = FixedGroups(vec![vec!["p", "q"], vec!["a", "d"]]);

        let outcome = fuse_candidates(&mut graph, &rule, &ReachabilityCycleCheck, 64).unwrap();
        assert_eq!(outcome.fused, 1);
        assert_eq!(outcome.rejected[0].1, RejectReason::Cycle);
    }
}
