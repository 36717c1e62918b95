//! Core traits for fusion-scheduler
//!
//! Defines the capability interfaces of the external collaborators the
//! pipeline drives: graph passes, buffer fusion rules and code generation.

use crate::error::FusionResult;
use crate::graph::ComputeGraph;

/// Statistics reported by one pass application
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Number of patterns matched
    pub patterns_matched: usize,
    /// Number of rewrites applied
    pub rewrites_applied: usize,
    /// Names of rewritten nodes
    pub touched_nodes: Vec<String>,
}

impl PassReport {
    /// Create empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful rewrite
    pub fn record(&mut self, node_name: &str) {
        self.rewrites_applied += 1;
        self.touched_nodes.push(node_name.to_string());
    }

    /// Whether the pass changed anything
    pub fn changed(&self) -> bool {
        self.rewrites_applied > 0
    }

    /// Merge with another report
    pub fn merge(&mut self, other: PassReport) {
        self.patterns_matched += other.patterns_matched;
        self.rewrites_applied += other.rewrites_applied;
        self.touched_nodes.extend(other.touched_nodes);
    }
}

/// Graph-level rewrite pass
///
/// # Example
///
/// ```ignore
/// struct DropIdentity;
///
/// impl GraphFusionPass<Graph> for DropIdentity {
///     fn apply(&self, graph: &mut Graph) -> FusionResult<PassReport> {
///         let mut report = PassReport::new();
///         for name in graph.find_nodes_by_op("Identity") {
///             graph.bypass_node(&name)?;
///             report.record(&name);
///         }
///         Ok(report)
///     }
/// }
/// ```
pub trait GraphFusionPass<G: ComputeGraph>: Send + Sync {
    /// Apply the pass to one graph (the pipeline recurses into subgraphs)
    fn apply(&self, graph: &mut G) -> FusionResult<PassReport>;

    /// Check if this pass is applicable to the graph
    fn is_applicable(&self, _graph: &G) -> bool {
        true
    }
}

impl<G, F> GraphFusionPass<G> for F
where
    G: ComputeGraph,
    F: Fn(&mut G) -> FusionResult<PassReport> + Send + Sync,
{
    fn apply(&self, graph: &mut G) -> FusionResult<PassReport> {
        self(graph)
    }
}

/// A group of nodes a buffer rule proposes to fuse into one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionCandidate {
    /// Member node names
    pub nodes: Vec<String>,
}

impl FusionCandidate {
    /// Create a candidate from member names
    pub fn new<S: Into<String>>(nodes: impl IntoIterator<Item = S>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `name` is a member
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n == name)
    }
}

/// Buffer (kernel) fusion rule
///
/// Matching is read-only; the pipeline screens candidates for cycles and
/// overlaps before asking the rule to fuse the survivors.
pub trait BufferFusionPass<G: ComputeGraph>: Send + Sync {
    /// Propose candidate groups on an unmodified view of the graph
    fn match_candidates(&self, graph: &G) -> FusionResult<Vec<FusionCandidate>>;

    /// Fuse one accepted candidate
    ///
    /// Fusing must not remove any dependency between nodes outside the
    /// candidate. Cycle rejections from the pre-screen on the unmodified
    /// graph are kept for the rest of the rule, so they must stay valid
    /// after earlier candidates are fused.
    fn fuse(&self, graph: &mut G, candidate: &FusionCandidate) -> FusionResult<()>;
}

/// Caller-supplied check: would fusing `candidate` introduce a cycle
pub trait CycleCheck<G>: Send + Sync {
    /// True when the candidate must be rejected
    fn would_introduce_cycle(&self, graph: &G, candidate: &FusionCandidate) -> bool;
}

/// Downstream code generation, opaque to the scheduler
pub trait CodeGenerator<G: ComputeGraph>: Send + Sync {
    /// Compile the fully fused graph
    fn compile(&self, graph: &mut G) -> FusionResult<()>;

    /// Post-process after compilation
    fn post_process(&self, _graph: &mut G) -> FusionResult<()> {
        Ok(())
    }
}
