//! # Fusion Scheduler
//!
//! Fusion-pass scheduling and switch resolution for neural-network graph
//! compilers.
//!
//! The crate decides which fusion passes run on a computation graph, in what
//! order, and drives them through a staged pipeline before handing the graph
//! to code generation.
//!
//! ## Features
//!
//! - **Configuration ingestion**: nested JSON (custom and built-in), a
//!   legacy `name:on/off` switch file and a license allow-list
//! - **Priority bands**: every pass gets a unique priority inside the band of
//!   its owner type and level, giving a total execution order
//! - **Switch resolution**: a fixed chain over option overrides, the
//!   exceptional set, forbidden-closed passes, licensing and switch maps
//! - **Staged pipeline**: graph stages with subgraph recursion and
//!   topological sorting, buffer fusion with cycle screening
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fusion_scheduler::prelude::*;
//!
//! let config = Arc::new(FusionConfig::new(
//!     ConfigSources::new()
//!         .with_custom("fusion_custom.json")
//!         .with_builtin("fusion_builtin.json"),
//! ));
//!
//! let mut pipeline = FusionPipeline::for_graph(config);
//! pipeline.register_graph_pass(PassDescriptor::graph("DropIdentity"), drop_identity)?;
//!
//! let options = OptimizationOptions::new();
//! let report = pipeline.optimize(&mut graph, &OptimizeContext::new(&options))?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod config;
pub mod error;
pub mod graph;
pub mod pass;
pub mod pipeline;
pub mod priority;
pub mod switch;
pub mod traits;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use fusion_scheduler::prelude::*`
pub mod prelude {
    pub use crate::config::{ConfigSources, FusionConfig, FusionTables, LicenseAllowList, LoadOutcome};
    pub use crate::error::{ConfigError, FusionError, FusionResult};
    pub use crate::graph::{ComputeGraph, Graph, OpNode, ReachabilityCycleCheck};
    pub use crate::pass::{FusionType, OwnerType, PassAttrs, PassDescriptor, PriorityLevel};
    pub use crate::pipeline::{
        FusionPipeline, OptimizeContext, OptimizeReport, PipelineOptions, RollbackPolicy, Stage,
    };
    pub use crate::priority::{band_of, PriorityBand, PriorityRegistry};
    pub use crate::switch::{
        Decision, LevelSignal, LicenseProvider, OptimizationOptions, OptionProvider, Rule, Scene,
        SwitchResolver,
    };
    pub use crate::traits::{
        BufferFusionPass, CodeGenerator, CycleCheck, FusionCandidate, GraphFusionPass, PassReport,
    };
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{ConfigError, FusionError, FusionResult};
pub use pipeline::FusionPipeline;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
