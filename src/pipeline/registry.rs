use indexmap::IndexMap;

use crate::error::{FusionError, FusionResult};
use crate::graph::ComputeGraph;
use crate::pass::{FusionType, PassDescriptor};
use crate::traits::{BufferFusionPass, GraphFusionPass};

use super::stage::Stage;

/// A registered graph pass
pub struct GraphEntry<G: ComputeGraph> {
    /// Registration-time identity
    pub descriptor: PassDescriptor,
    /// Implementation
    pub pass: Box<dyn GraphFusionPass<G>>,
}

/// A registered buffer fusion rule
pub struct BufferEntry<G: ComputeGraph> {
    /// Registration-time identity
    pub descriptor: PassDescriptor,
    /// Implementation
    pub pass: Box<dyn BufferFusionPass<G>>,
}

/// Registered passes, keyed by name within each fusion type
pub struct PassRegistry<G: ComputeGraph> {
    graph: IndexMap<String, GraphEntry<G>>,
    buffer: IndexMap<String, BufferEntry<G>>,
}

impl<G: ComputeGraph> Default for PassRegistry<G> {
    fn default() -> Self {
        Self {
            graph: IndexMap::new(),
            buffer: IndexMap::new(),
        }
    }
}

impl<G: ComputeGraph> std::fmt::Debug for PassRegistry<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassRegistry")
            .field("graph", &self.graph.keys().collect::<Vec<_>>())
            .field("buffer", &self.buffer.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<G: ComputeGraph> PassRegistry<G> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a graph pass
    pub fn register_graph(
        &mut self,
        descriptor: PassDescriptor,
        pass: Box<dyn GraphFusionPass<G>>,
    ) -> FusionResult<()> {
        if descriptor.fusion_type != FusionType::Graph {
            return Err(FusionError::Registration(format!(
                "`{}` is a {} pass, expected graph",
                descriptor.name, descriptor.fusion_type
            )));
        }
        if !descriptor.stage.is_graph_stage() {
            return Err(FusionError::Registration(format!(
                "graph pass `{}` cannot run in stage {}",
                descriptor.name, descriptor.stage
            )));
        }
        if self.graph.contains_key(&descriptor.name) {
            return Err(duplicate(&descriptor));
        }
        self.graph
            .insert(descriptor.name.clone(), GraphEntry { descriptor, pass });
        Ok(())
    }

    /// Register a buffer fusion rule
    pub fn register_buffer(
        &mut self,
        descriptor: PassDescriptor,
        pass: Box<dyn BufferFusionPass<G>>,
    ) -> FusionResult<()> {
        if descriptor.fusion_type != FusionType::Buffer {
            return Err(FusionError::Registration(format!(
                "`{}` is a {} pass, expected buffer",
                descriptor.name, descriptor.fusion_type
            )));
        }
        if descriptor.stage != Stage::BufferFusionMatch {
            return Err(FusionError::Registration(format!(
                "buffer pass `{}` must run in stage {}",
                descriptor.name,
                Stage::BufferFusionMatch
            )));
        }
        if self.buffer.contains_key(&descriptor.name) {
            return Err(duplicate(&descriptor));
        }
        self.buffer
            .insert(descriptor.name.clone(), BufferEntry { descriptor, pass });
        Ok(())
    }

    /// Registered graph pass by name
    pub fn graph_pass(&self, name: &str) -> Option<&GraphEntry<G>> {
        self.graph.get(name)
    }

    /// Registered buffer rule by name
    pub fn buffer_pass(&self, name: &str) -> Option<&BufferEntry<G>> {
        self.buffer.get(name)
    }

    /// Descriptors of every registered pass, in registration order per fusion type
    pub fn descriptors(&self) -> impl Iterator<Item = &PassDescriptor> {
        self.graph
            .values()
            .map(|e| &e.descriptor)
            .chain(self.buffer.values().map(|e| &e.descriptor))
    }

    /// Number of registered passes of a fusion type
    pub fn len(&self, fusion_type: FusionType) -> usize {
        match fusion_type {
            FusionType::Graph => self.graph.len(),
            FusionType::Buffer => self.buffer.len(),
        }
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty() && self.buffer.is_empty()
    }
}

fn duplicate(descriptor: &PassDescriptor) -> FusionError {
    FusionError::Registration(format!(
        "{} pass `{}` is already registered",
        descriptor.fusion_type, descriptor.name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::traits::{FusionCandidate, PassReport};

    struct NoMatch;

    impl BufferFusionPass<Graph> for NoMatch {
        fn match_candidates(&self, _graph: &Graph) -> FusionResult<Vec<FusionCandidate>> {
            Ok(Vec::new())
        }

        fn fuse(&self, _graph: &mut Graph, _candidate: &FusionCandidate) -> FusionResult<()> {
            Ok(())
        }
    }

    fn noop() -> Box<dyn GraphFusionPass<Graph>> {
        Box::new(|_: &mut Graph| -> FusionResult<PassReport> { Ok(PassReport::new()) })
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PassRegistry::<Graph>::new();
        registry.register_graph(PassDescriptor::graph("A"), noop()).unwrap();
        let err = registry.register_graph(PassDescriptor::graph("A"), noop()).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(FusionType::Graph), 1);
    }

    #[test]
    fn test_same_name_in_other_namespace() {
        let mut registry = PassRegistry::<Graph>::new();
        registry.register_graph(PassDescriptor::graph("A"), noop()).unwrap();
        registry
            .register_buffer(PassDescriptor::buffer("A"), Box::new(NoMatch))
            .unwrap();
        assert_eq!(registry.descriptors().count(), 2);
    }

    #[test]
    fn test_wrong_fusion_type_rejected() {
        let mut registry = PassRegistry::<Graph>::new();
        assert!(registry.register_graph(PassDescriptor::buffer("A"), noop()).is_err());
        assert!(registry
            .register_buffer(PassDescriptor::graph("B"), Box::new(NoMatch))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_wrong_stage_rejected() {
        let mut registry = PassRegistry::<Graph>::new();
        let desc = PassDescriptor::graph("A").stage(Stage::Compile);
        assert!(registry.register_graph(desc, noop()).is_err());
        let desc = PassDescriptor::buffer("B").stage(Stage::Prepare);
        assert!(registry.register_buffer(desc, Box::new(NoMatch)).is_err());
    }
}
