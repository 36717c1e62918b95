//! Error types for fusion-scheduler
//!
//! This module defines all error types used throughout the crate.
//!
//! - [`ConfigError`]: everything that can go wrong while ingesting the switch,
//!   priority and license configuration. Every variant names the file it came
//!   from and, where it applies, the key path or line that caused it.
//! - [`FusionError`]: the crate-wide error returned by the pipeline and by pass
//!   implementations.

use thiserror::Error;

use crate::pass::{FusionType, OwnerType, PriorityLevel};
use crate::pipeline::Stage;
use crate::priority::PriorityBand;

/// Errors raised while parsing or validating configuration sources
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configured file could not be read
    #[error("failed to read {file}: {source}")]
    Io {
        /// File that failed
        file: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An explicitly configured file does not exist
    #[error("configuration file {file} does not exist")]
    Missing {
        /// File that was expected
        file: String,
    },

    /// The text is not valid JSON
    #[error("malformed JSON in {file}: {source}")]
    Json {
        /// File that failed
        file: String,
        /// Underlying parser error
        #[source]
        source: serde_json::Error,
    },

    /// A JSON value has the wrong shape
    #[error("{file}: `{key_path}` must be {expected}, found {found}")]
    Shape {
        /// File that failed
        file: String,
        /// Dotted path of the offending value
        key_path: String,
        /// What the schema requires at this position
        expected: &'static str,
        /// What was actually found
        found: &'static str,
    },

    /// A key that the schema does not permit
    #[error("{file}: unknown key `{key}` under `{parent}` (allowed: {allowed})")]
    UnknownKey {
        /// File that failed
        file: String,
        /// Dotted path of the containing object (`<root>` for the top level)
        parent: String,
        /// The offending key
        key: String,
        /// Human readable list of permitted keys
        allowed: &'static str,
    },

    /// A switch value other than `on`/`off`
    #[error("{file}: `{key_path}` has switch value {value:?}, expected \"on\" or \"off\"")]
    InvalidSwitchValue {
        /// File that failed
        file: String,
        /// Dotted path of the value
        key_path: String,
        /// Offending value
        value: String,
    },

    /// A priority value that is not an integer string
    #[error("{file}: `{key_path}` has priority {value:?}, expected an integer string")]
    InvalidPriority {
        /// File that failed
        file: String,
        /// Dotted path of the value
        key_path: String,
        /// Offending value
        value: String,
    },

    /// A priority value outside the band of its owner type and level
    #[error("{file}: priority {value} of `{key_path}` is outside the valid range {band}")]
    PriorityOutOfBand {
        /// File that failed
        file: String,
        /// Dotted path of the value
        key_path: String,
        /// Offending value
        value: i64,
        /// Band the value must lie in
        band: PriorityBand,
    },

    /// The same pass name appears twice in one priority table
    #[error("{file}: duplicate pass `{key_path}` in priority table")]
    DuplicatePass {
        /// File that failed
        file: String,
        /// Dotted path of the second occurrence
        key_path: String,
    },

    /// Two passes of one fusion type share a priority value in one file
    #[error("{file}: priority {value} of `{key_path}` is already used by `{other}`")]
    DuplicatePriority {
        /// File that failed
        file: String,
        /// Dotted path of the second occurrence
        key_path: String,
        /// Shared priority value
        value: u32,
        /// Pass that holds the value first
        other: String,
    },

    /// A malformed line in the legacy switch file
    #[error("{file}:{line}: {reason} in {content:?}")]
    LegacyLine {
        /// File that failed
        file: String,
        /// 1-based line number
        line: usize,
        /// Raw line content
        content: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// The same pass name appears twice in the legacy switch file
    #[error("{file}:{line}: duplicate pass `{name}` in switch file")]
    LegacyDuplicate {
        /// File that failed
        file: String,
        /// 1-based line number of the second occurrence
        line: usize,
        /// Duplicated pass name
        name: String,
    },

    /// Two passes resolve to the same effective priority
    #[error("{fusion_type} passes `{first}` and `{second}` share priority {priority}")]
    PriorityConflict {
        /// Namespace of the conflict
        fusion_type: FusionType,
        /// Shared priority value
        priority: u32,
        /// Pass that held the value first
        first: String,
        /// Pass that collided with it
        second: String,
    },

    /// A registered priority outside its band
    #[error("registered {fusion_type} pass `{pass}` declares priority {priority} outside {band}")]
    RegistrationOutOfBand {
        /// Namespace of the pass
        fusion_type: FusionType,
        /// Pass name
        pass: String,
        /// Declared priority
        priority: u32,
        /// Band implied by owner type and level
        band: PriorityBand,
    },

    /// No free priority value left in a default band
    #[error("no free {owner} {level} priority left in {band} for {fusion_type} pass `{pass}`")]
    BandExhausted {
        /// Namespace of the pass
        fusion_type: FusionType,
        /// Owner of the pass
        owner: OwnerType,
        /// Default level of the pass
        level: PriorityLevel,
        /// Exhausted band
        band: PriorityBand,
        /// Pass that could not be placed
        pass: String,
    },
}

/// Main error type for scheduling and pass application
#[derive(Error, Debug)]
pub enum FusionError {
    /// Configuration could not be loaded or validated
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A pass reported failure while being applied
    #[error("pass `{pass}` failed on graph `{graph}` during {stage}: {source}")]
    PassFailed {
        /// Pass name
        pass: String,
        /// Graph or subgraph the pass was applied to
        graph: String,
        /// Stage that was running
        stage: Stage,
        /// Error reported by the pass
        #[source]
        source: Box<FusionError>,
    },

    /// The code-generation collaborator failed
    #[error("code generation failed on graph `{graph}` during {stage}: {source}")]
    CodeGen {
        /// Graph handed to the code generator
        graph: String,
        /// Stage that was running
        stage: Stage,
        /// Error reported by the collaborator
        #[source]
        source: Box<FusionError>,
    },

    /// The graph contains a cycle and cannot be sorted
    #[error("graph `{0}` contains a cycle")]
    CycleDetected(String),

    /// Node lookup failed
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Structurally invalid graph or fusion request
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Pass registration rejected
    #[error("invalid pass registration: {0}")]
    Registration(String),

    /// Generic failure reported by an external pass
    #[error("{0}")]
    Pass(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for scheduling operations
pub type FusionResult<T> = Result<T, FusionError>;
