//! Staged fusion pipeline
//!
//! ```text
//! Init → Prepare → OriginalFusion → FormatDtypeJudge → TransNodeInsertion
//!      → SecondRoundFusion → BufferFusionMatch → Compile → PostProcess → Done
//! ```
//!
//! Any failure moves the call to `Error`. `Init` reloads configuration when
//! its sources changed. Graph stages run the enabled graph passes registered
//! for that stage in priority order, on the main graph and then on every
//! nested subgraph, and leave every graph topologically sorted. The buffer
//! stage runs the enabled buffer rules in priority order and fuses the
//! candidates that survive cycle and overlap screening. `Compile` and
//! `PostProcess` hand the graph to the code generator.

pub mod buffer;
mod core;
mod registry;
mod stage;

pub use self::core::{
    AppliedPass, FusionPipeline, OptimizeContext, OptimizeReport, PipelineOptions,
    RejectedCandidate, RollbackPolicy, SkippedPass,
};
pub use buffer::{BufferOutcome, RejectReason};
pub use registry::{BufferEntry, GraphEntry, PassRegistry};
pub use stage::{Stage, StageMachine};
