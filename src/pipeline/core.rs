use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, warn};

use crate::config::{FusionConfig, FusionTables, LoadOutcome};
use crate::error::{ConfigError, FusionError, FusionResult};
use crate::graph::{graph_count, walk_mut, ComputeGraph, Graph, ReachabilityCycleCheck};
use crate::pass::{FusionType, PassDescriptor};
use crate::priority::PriorityRegistry;
use crate::switch::{LicenseProvider, OptionProvider, Rule, Scene, SwitchResolver};
use crate::traits::{
    BufferFusionPass, CodeGenerator, CycleCheck, FusionCandidate, GraphFusionPass, PassReport,
};

use super::buffer::{fuse_candidates, RejectReason};
use super::registry::PassRegistry;
use super::stage::{Stage, StageMachine};

// ============================================================================
// Options and report
// ============================================================================

/// What happens to the graph when a stage fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RollbackPolicy {
    /// Leave the graph as the failing stage left it
    #[default]
    None,
    /// Restore the graph as it was when the failing stage started
    Stage,
}

/// Pipeline options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Graph state after a failed stage
    pub rollback: RollbackPolicy,
    /// Candidate count from which the cycle pre-screen runs in parallel
    pub parallel_threshold: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            rollback: RollbackPolicy::None,
            parallel_threshold: 32,
        }
    }
}

impl PipelineOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rollback policy
    pub fn with_rollback(mut self, rollback: RollbackPolicy) -> Self {
        self.rollback = rollback;
        self
    }

    /// Set the parallel pre-screen threshold
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}

/// Caller inputs of one `optimize` call
#[derive(Clone, Copy)]
pub struct OptimizeContext<'a> {
    /// Option overrides and level signal
    pub options: &'a dyn OptionProvider,
    /// Execution scene
    pub scene: Scene,
    /// License provider replacing the configured allow-list
    pub license: Option<&'a dyn LicenseProvider>,
}

impl<'a> OptimizeContext<'a> {
    /// Whole-graph scene with the configured license
    pub fn new(options: &'a dyn OptionProvider) -> Self {
        Self {
            options,
            scene: Scene::Graph,
            license: None,
        }
    }

    /// Set the scene
    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scene = scene;
        self
    }

    /// Use another license provider
    pub fn with_license(mut self, license: &'a dyn LicenseProvider) -> Self {
        self.license = Some(license);
        self
    }
}

/// A pass that ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedPass {
    /// Pass name
    pub pass: String,
    /// Stage it ran in
    pub stage: Stage,
    /// Graphs it was applied to (main graph and subgraphs)
    pub graphs: usize,
    /// Merged statistics over all graphs
    pub report: PassReport,
}

/// A pass the resolver disabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPass {
    /// Pass name
    pub pass: String,
    /// Stage it would have run in
    pub stage: Stage,
    /// Rule that disabled it
    pub rule: Rule,
}

/// A buffer fusion candidate that was not fused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCandidate {
    /// Rule that proposed it
    pub pass: String,
    /// Graph it was proposed on
    pub graph: String,
    /// Candidate members
    pub nodes: Vec<String>,
    /// Why it was rejected
    pub reason: RejectReason,
}

/// Summary of one `optimize` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Stages entered, in order
    pub stages: Vec<Stage>,
    /// Passes that ran, in execution order
    pub applied: Vec<AppliedPass>,
    /// Passes disabled by the resolver
    pub skipped: Vec<SkippedPass>,
    /// Rejected buffer fusion candidates
    pub rejected: Vec<RejectedCandidate>,
    /// Number of fused buffer candidates
    pub fused_groups: usize,
    /// Graphs in scope: the main graph plus every nested subgraph
    pub graphs: usize,
    /// Whether `Init` installed new tables
    pub config_reloaded: bool,
    /// Generation of the tables used
    pub generation: u64,
}

impl OptimizeReport {
    /// Names of the passes that ran, in execution order
    pub fn applied_names(&self) -> Vec<&str> {
        self.applied.iter().map(|a| a.pass.as_str()).collect()
    }

    /// Whether a pass ran
    pub fn was_applied(&self, pass: &str) -> bool {
        self.applied.iter().any(|a| a.pass == pass)
    }

    /// Rule that disabled a pass, if it was skipped
    pub fn skip_rule(&self, pass: &str) -> Option<Rule> {
        self.skipped.iter().find(|s| s.pass == pass).map(|s| s.rule)
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Staged fusion pipeline over caller-owned graphs
///
/// One pipeline may serve many `optimize` calls, concurrently or in
/// sequence. The pass ordering is rebuilt only when the installed tables
/// change or a pass is registered.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use fusion_scheduler::prelude::*;
///
/// let config = Arc::new(FusionConfig::new(ConfigSources::from_env()));
/// let mut pipeline = FusionPipeline::for_graph(config);
/// pipeline.register_graph_pass(PassDescriptor::graph("DropIdentity"), DropIdentity)?;
///
/// let options = OptimizationOptions::new();
/// let report = pipeline.optimize(&mut graph, &OptimizeContext::new(&options))?;
/// ```
pub struct FusionPipeline<G: ComputeGraph> {
    config: Arc<FusionConfig>,
    passes: PassRegistry<G>,
    cycle_check: Option<Box<dyn CycleCheck<G>>>,
    codegen: Option<Box<dyn CodeGenerator<G>>>,
    options: PipelineOptions,
    ordering: Mutex<Option<(u64, Arc<PriorityRegistry>)>>,
}

impl<G: ComputeGraph> std::fmt::Debug for FusionPipeline<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionPipeline")
            .field("config", &self.config)
            .field("passes", &self.passes)
            .field("cycle_check", &self.cycle_check.is_some())
            .field("codegen", &self.codegen.is_some())
            .field("options", &self.options)
            .finish()
    }
}

impl FusionPipeline<Graph> {
    /// Pipeline over [`Graph`] with the reachability cycle check
    pub fn for_graph(config: Arc<FusionConfig>) -> Self {
        Self::new(config).with_cycle_check(ReachabilityCycleCheck)
    }
}

impl<G> FusionPipeline<G>
where
    G: ComputeGraph + Send + Sync,
{
    /// Create a pipeline with no passes
    pub fn new(config: Arc<FusionConfig>) -> Self {
        Self {
            config,
            passes: PassRegistry::new(),
            cycle_check: None,
            codegen: None,
            options: PipelineOptions::default(),
            ordering: Mutex::new(None),
        }
    }

    /// Set the cycle check used by the buffer stage
    pub fn with_cycle_check(mut self, check: impl CycleCheck<G> + 'static) -> Self {
        self.cycle_check = Some(Box::new(check));
        self
    }

    /// Set the code generator called in `Compile` and `PostProcess`
    pub fn with_codegen(mut self, codegen: impl CodeGenerator<G> + 'static) -> Self {
        self.codegen = Some(Box::new(codegen));
        self
    }

    /// Set pipeline options
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Shared configuration
    pub fn config(&self) -> &Arc<FusionConfig> {
        &self.config
    }

    /// Registered passes
    pub fn passes(&self) -> &PassRegistry<G> {
        &self.passes
    }

    /// Register a graph fusion pass
    pub fn register_graph_pass(
        &mut self,
        descriptor: PassDescriptor,
        pass: impl GraphFusionPass<G> + 'static,
    ) -> FusionResult<()> {
        self.passes.register_graph(descriptor, Box::new(pass))?;
        *self.ordering.get_mut() = None;
        Ok(())
    }

    /// Register a buffer fusion rule
    pub fn register_buffer_pass(
        &mut self,
        descriptor: PassDescriptor,
        pass: impl BufferFusionPass<G> + 'static,
    ) -> FusionResult<()> {
        self.passes.register_buffer(descriptor, Box::new(pass))?;
        *self.ordering.get_mut() = None;
        Ok(())
    }

    /// Execution order under the current tables
    pub fn ordering(&self) -> FusionResult<Arc<PriorityRegistry>> {
        self.load_validated()?;
        Ok(self.ordering_for(&self.config.tables())?)
    }

    /// Run every stage on `graph`
    pub fn optimize(&self, graph: &mut G, ctx: &OptimizeContext<'_>) -> FusionResult<OptimizeReport> {
        let span = info_span!("optimize", graph = graph.name());
        let _enter = span.enter();

        let mut machine = StageMachine::new();
        let mut report = OptimizeReport::default();
        let result = self.run_stages(graph, ctx, &mut machine, &mut report);
        if let Err(err) = &result {
            error!(stage = %machine.current(), error = %err, "optimization aborted");
            machine.fail();
        }
        report.stages = machine.visited().to_vec();
        result.map(|()| report)
    }

    fn run_stages(
        &self,
        graph: &mut G,
        ctx: &OptimizeContext<'_>,
        machine: &mut StageMachine,
        report: &mut OptimizeReport,
    ) -> FusionResult<()> {
        let outcome = self.load_validated()?;
        report.config_reloaded = outcome == LoadOutcome::Reloaded;
        let tables = self.config.tables();
        report.generation = tables.generation;
        report.graphs = graph_count(graph);
        let ordering = self.ordering_for(&tables)?;

        let mut resolver = SwitchResolver::new(&tables, ctx.options, self.config.forbidden_closed());
        if let Some(license) = ctx.license {
            resolver = resolver.with_license(license);
        }

        loop {
            let stage = machine.advance();
            if stage == Stage::Done {
                info!("optimization finished");
                return Ok(());
            }
            debug!(%stage, "entering stage");

            let snapshot = match self.options.rollback {
                RollbackPolicy::Stage => graph.snapshot(),
                RollbackPolicy::None => None,
            };

            let result = match stage {
                Stage::BufferFusionMatch => {
                    self.run_buffer_stage(graph, &ordering, &resolver, ctx.scene, report)
                }
                Stage::Compile => self.run_codegen(graph, stage, |cg, g| cg.compile(g)),
                Stage::PostProcess => self.run_codegen(graph, stage, |cg, g| cg.post_process(g)),
                stage if stage.is_graph_stage() => {
                    self.run_graph_stage(stage, graph, &ordering, &resolver, ctx.scene, report)
                }
                other => Err(FusionError::Internal(format!("unexpected stage {other}"))),
            };

            if let Err(err) = result {
                if let Some(saved) = snapshot {
                    *graph = saved;
                    warn!(%stage, "restored graph after failed stage");
                }
                return Err(err);
            }
        }
    }

    // New tables are installed only when they order this pipeline's passes.
    fn load_validated(&self) -> Result<LoadOutcome, ConfigError> {
        self.config
            .ensure_loaded_with(|candidate| self.ordering_for(candidate).map(drop))
    }

    fn ordering_for(&self, tables: &FusionTables) -> Result<Arc<PriorityRegistry>, ConfigError> {
        let mut cache = self.ordering.lock();
        if let Some((generation, registry)) = cache.as_ref() {
            if *generation == tables.generation {
                return Ok(Arc::clone(registry));
            }
        }

        let registry = Arc::new(PriorityRegistry::with_registrations(
            &tables.priorities,
            self.passes.descriptors(),
        )?);
        info!(
            generation = tables.generation,
            graph_passes = registry.len(FusionType::Graph),
            buffer_passes = registry.len(FusionType::Buffer),
            "rebuilt pass ordering"
        );
        *cache = Some((tables.generation, Arc::clone(&registry)));
        Ok(registry)
    }

    fn run_graph_stage(
        &self,
        stage: Stage,
        graph: &mut G,
        ordering: &PriorityRegistry,
        resolver: &SwitchResolver<'_>,
        scene: Scene,
        report: &mut OptimizeReport,
    ) -> FusionResult<()> {
        for name in ordering.order_for(FusionType::Graph) {
            let Some(entry) = self.passes.graph_pass(name) else {
                continue;
            };
            if entry.descriptor.stage != stage {
                continue;
            }

            let decision = resolver.resolve_pass(&entry.descriptor, scene);
            if !decision.enabled {
                debug!(pass = name, rule = %decision.rule, "pass disabled");
                report.skipped.push(SkippedPass {
                    pass: name.to_string(),
                    stage,
                    rule: decision.rule,
                });
                continue;
            }

            let mut merged = PassReport::new();
            let mut graphs = 0;
            walk_mut(graph, &mut |g: &mut G| {
                if !entry.pass.is_applicable(g) {
                    return Ok(());
                }
                match entry.pass.apply(g) {
                    Ok(pass_report) => {
                        graphs += 1;
                        merged.merge(pass_report);
                        Ok(())
                    }
                    Err(source) => Err(FusionError::PassFailed {
                        pass: name.to_string(),
                        graph: g.name().to_string(),
                        stage,
                        source: Box::new(source),
                    }),
                }
            })?;

            debug!(
                pass = name,
                graphs,
                changed = merged.changed(),
                rewrites = merged.rewrites_applied,
                "pass applied"
            );
            report.applied.push(AppliedPass {
                pass: name.to_string(),
                stage,
                graphs,
                report: merged,
            });
        }

        walk_mut(graph, &mut |g: &mut G| g.topological_sort())
    }

    fn run_buffer_stage(
        &self,
        graph: &mut G,
        ordering: &PriorityRegistry,
        resolver: &SwitchResolver<'_>,
        scene: Scene,
        report: &mut OptimizeReport,
    ) -> FusionResult<()> {
        let stage = Stage::BufferFusionMatch;
        if self.passes.len(FusionType::Buffer) == 0 {
            return Ok(());
        }
        let Some(check) = self.cycle_check.as_deref() else {
            return Err(FusionError::Registration(
                "buffer fusion rules are registered but no cycle check is set".to_string(),
            ));
        };

        for name in ordering.order_for(FusionType::Buffer) {
            let Some(entry) = self.passes.buffer_pass(name) else {
                continue;
            };

            let decision = resolver.resolve_pass(&entry.descriptor, scene);
            if !decision.enabled {
                debug!(pass = name, rule = %decision.rule, "rule disabled");
                report.skipped.push(SkippedPass {
                    pass: name.to_string(),
                    stage,
                    rule: decision.rule,
                });
                continue;
            }

            let mut merged = PassReport::new();
            let mut graphs = 0;
            walk_mut(graph, &mut |g: &mut G| {
                let outcome = fuse_candidates(g, entry.pass.as_ref(), check, self.options.parallel_threshold)
                    .map_err(|source| FusionError::PassFailed {
                        pass: name.to_string(),
                        graph: g.name().to_string(),
                        stage,
                        source: Box::new(source),
                    })?;

                graphs += 1;
                merged.patterns_matched += outcome.fused + outcome.rejected.len();
                merged.rewrites_applied += outcome.fused;
                report.fused_groups += outcome.fused;
                report
                    .rejected
                    .extend(outcome.rejected.into_iter().map(|(candidate, reason)| {
                        rejected(name, g.name(), candidate, reason)
                    }));
                Ok(())
            })?;

            report.applied.push(AppliedPass {
                pass: name.to_string(),
                stage,
                graphs,
                report: merged,
            });
        }

        walk_mut(graph, &mut |g: &mut G| g.topological_sort())
    }

    fn run_codegen(
        &self,
        graph: &mut G,
        stage: Stage,
        call: impl FnOnce(&dyn CodeGenerator<G>, &mut G) -> FusionResult<()>,
    ) -> FusionResult<()> {
        let Some(codegen) = self.codegen.as_deref() else {
            return Ok(());
        };
        call(codegen, &mut *graph).map_err(|source| FusionError::CodeGen {
            graph: graph.name().to_string(),
            stage,
            source: Box::new(source),
        })
    }
}

fn rejected(pass: &str, graph: &str, candidate: FusionCandidate, reason: RejectReason) -> RejectedCandidate {
    RejectedCandidate {
        pass: pass.to_string(),
        graph: graph.to_string(),
        nodes: candidate.nodes,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FusionTables, PriorityEntry};
    use crate::graph::OpNode;
    use crate::pass::{OwnerType, PriorityLevel};
    use crate::switch::OptimizationOptions;

    fn tables_with_priorities(entries: &[(&str, u32)]) -> FusionTables {
        let mut tables = FusionTables::default();
        for (name, priority) in entries {
            tables.priorities.graph.insert_if_absent(
                name,
                PriorityEntry {
                    priority: *priority,
                    owner: OwnerType::Custom,
                    level: PriorityLevel::Top,
                },
            );
        }
        tables
    }

    fn recorder(tag: &'static str) -> impl GraphFusionPass<Graph> {
        move |g: &mut Graph| -> FusionResult<PassReport> {
            g.insert_node(OpNode::new(&format!("{tag}_{}", g.node_count()), tag, &[], &[]));
            let mut report = PassReport::new();
            report.record(tag);
            Ok(report)
        }
    }

    fn main_graph() -> Graph {
        Graph::from_nodes("main", [OpNode::new("n0", "Relu", &["x"], &["y"])])
            .with_inputs(&["x"])
            .with_outputs(&["y"])
    }

    #[test]
    fn test_order_follows_priority() {
        let config = Arc::new(FusionConfig::from_tables(tables_with_priorities(&[("B", 5), ("A", 10)])));
        let mut pipeline = FusionPipeline::for_graph(config);
        pipeline.register_graph_pass(PassDescriptor::graph("A"), recorder("A")).unwrap();
        pipeline.register_graph_pass(PassDescriptor::graph("B"), recorder("B")).unwrap();

        let options = OptimizationOptions::new();
        let mut graph = main_graph();
        let report = pipeline.optimize(&mut graph, &OptimizeContext::new(&options)).unwrap();

        assert_eq!(report.applied_names(), vec!["B", "A"]);
        assert_eq!(report.stages.last(), Some(&Stage::Done));
        assert_eq!(report.stages.len(), 10);
    }

    #[test]
    fn test_stage_grouping() {
        let config = Arc::new(FusionConfig::from_tables(FusionTables::default()));
        let mut pipeline = FusionPipeline::for_graph(config);
        pipeline
            .register_graph_pass(PassDescriptor::graph("Late").stage(Stage::SecondRoundFusion), recorder("L"))
            .unwrap();
        pipeline
            .register_graph_pass(PassDescriptor::graph("Early").stage(Stage::Prepare), recorder("E"))
            .unwrap();

        let options = OptimizationOptions::new();
        let report = pipeline
            .optimize(&mut main_graph(), &OptimizeContext::new(&options))
            .unwrap();
        assert_eq!(report.applied_names(), vec!["Early", "Late"]);
        assert_eq!(report.applied[0].stage, Stage::Prepare);
    }

    #[test]
    fn test_disabled_pass_is_skipped() {
        let config = Arc::new(FusionConfig::from_tables(FusionTables::default()));
        let mut pipeline = FusionPipeline::for_graph(config);
        pipeline.register_graph_pass(PassDescriptor::graph("A"), recorder("A")).unwrap();

        let options = OptimizationOptions::new().with_override("A", false);
        let report = pipeline
            .optimize(&mut main_graph(), &OptimizeContext::new(&options))
            .unwrap();
        assert!(!report.was_applied("A"));
        assert_eq!(report.skip_rule("A"), Some(Rule::OptionOverride));
    }

    #[test]
    fn test_ordering_cached_per_generation() {
        let config = Arc::new(FusionConfig::from_tables(FusionTables::default()));
        let mut pipeline = FusionPipeline::for_graph(config);
        pipeline.register_graph_pass(PassDescriptor::graph("A"), recorder("A")).unwrap();

        let first = pipeline.ordering().unwrap();
        let second = pipeline.ordering().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        pipeline.register_graph_pass(PassDescriptor::graph("B"), recorder("B")).unwrap();
        let third = pipeline.ordering().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.order_for(FusionType::Graph), vec!["A", "B"]);
    }

    #[test]
    fn test_codegen_failure_is_reported() {
        struct FailingCodegen;
        impl CodeGenerator<Graph> for FailingCodegen {
            fn compile(&self, _graph: &mut Graph) -> FusionResult<()> {
                Err(FusionError::Pass("no kernel".to_string()))
            }
        }

        let config = Arc::new(FusionConfig::from_tables(FusionTables::default()));
        let pipeline = FusionPipeline::for_graph(config).with_codegen(FailingCodegen);
        let options = OptimizationOptions::new();
        let err = pipeline
            .optimize(&mut main_graph(), &OptimizeContext::new(&options))
            .unwrap_err();
        assert!(matches!(err, FusionError::CodeGen { stage: Stage::Compile, .. }));
    }

    #[test]
    fn test_buffer_rules_need_cycle_check() {
        struct Nothing;
        impl BufferFusionPass<Graph> for Nothing {
            fn match_candidates(&self, _graph: &Graph) -> FusionResult<Vec<FusionCandidate>> {
                Ok(Vec::new())
            }
            fn fuse(&self, _graph: &mut Graph, _candidate: &FusionCandidate) -> FusionResult<()> {
                Ok(())
            }
        }

        let config = Arc::new(FusionConfig::from_tables(FusionTables::default()));
        let mut pipeline = FusionPipeline::<Graph>::new(config);
        pipeline.register_buffer_pass(PassDescriptor::buffer("R"), Nothing).unwrap();
        let options = OptimizationOptions::new();
        let err = pipeline
            .optimize(&mut main_graph(), &OptimizeContext::new(&options))
            .unwrap_err();
        assert!(matches!(err, FusionError::Registration(_)));
    }
}
