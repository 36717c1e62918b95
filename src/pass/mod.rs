//! Pass identity model
//!
//! Every fusion pass is identified by its name within a fusion-type namespace
//! and carries the static facts the scheduler needs:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `name` | unique within its fusion type |
//! | `owner` | [`OwnerType::Custom`] (user supplied) or [`OwnerType::BuiltIn`] |
//! | `fusion_type` | [`FusionType::Graph`] or [`FusionType::Buffer`] |
//! | `level` | priority tier, selects the [`PriorityBand`](crate::priority::PriorityBand) |
//! | `attrs` | [`PassAttrs`] bitmask |
//!
//! # Example
//!
//! ```ignore
//! use fusion_scheduler::pass::{PassAttrs, PassDescriptor, PriorityLevel};
//!
//! let desc = PassDescriptor::graph("ConvBiasFusionPass")
//!     .builtin()
//!     .level(PriorityLevel::Main)
//!     .priority(4100)
//!     .attrs(PassAttrs::FORBIDDEN_CLOSED);
//! ```

use std::fmt;

use bitflags::bitflags;

use crate::pipeline::Stage;

/// Fusion-type namespace of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FusionType {
    /// General graph-level rewrites
    Graph,
    /// Memory/kernel-level (buffer) fusion
    Buffer,
}

impl FusionType {
    /// Both namespaces, in scheduling order
    pub const ALL: [FusionType; 2] = [FusionType::Graph, FusionType::Buffer];

    /// Key used for this namespace in configuration files
    pub fn config_key(self) -> &'static str {
        match self {
            FusionType::Graph => "GraphFusion",
            FusionType::Buffer => "UBFusion",
        }
    }

    /// Parse a configuration key
    pub fn from_config_key(key: &str) -> Option<Self> {
        match key {
            "GraphFusion" => Some(FusionType::Graph),
            "UBFusion" => Some(FusionType::Buffer),
            _ => None,
        }
    }
}

impl fmt::Display for FusionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionType::Graph => f.write_str("graph"),
            FusionType::Buffer => f.write_str("buffer"),
        }
    }
}

/// Who supplied a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OwnerType {
    /// Supplied by the end user
    Custom,
    /// Ships with the compiler
    BuiltIn,
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerType::Custom => f.write_str("custom"),
            OwnerType::BuiltIn => f.write_str("built-in"),
        }
    }
}

/// Priority tier within an owner type
///
/// `Top`, `Main` and `Down` are the tiers configuration files may name.
/// `Pass` and `Rule` are the default tiers for registered passes that carry
/// no configured priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PriorityLevel {
    /// Runs before the main tier
    Top,
    /// Main tier
    Main,
    /// Runs after the main tier
    Down,
    /// Default tier of registered graph passes
    Pass,
    /// Default tier of registered pattern rules
    Rule,
}

impl PriorityLevel {
    /// Tiers that may appear in a configuration file
    pub const CONFIGURABLE: [PriorityLevel; 3] =
        [PriorityLevel::Top, PriorityLevel::Main, PriorityLevel::Down];

    /// Parse a configuration key (`Top`, `Main`, `Down`)
    pub fn from_config_key(key: &str) -> Option<Self> {
        match key {
            "Top" => Some(PriorityLevel::Top),
            "Main" => Some(PriorityLevel::Main),
            "Down" => Some(PriorityLevel::Down),
            _ => None,
        }
    }

    /// Whether the tier may appear in a configuration file
    pub fn is_configurable(self) -> bool {
        Self::CONFIGURABLE.contains(&self)
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriorityLevel::Top => "Top",
            PriorityLevel::Main => "Main",
            PriorityLevel::Down => "Down",
            PriorityLevel::Pass => "Pass",
            PriorityLevel::Rule => "Rule",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Static attributes of a pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PassAttrs: u32 {
        /// Defaults to enabled unless explicitly overridden
        const FORBIDDEN_CLOSED = 1 << 0;
        /// Stays enabled in single-op scenes
        const SINGLE_OP_SCENE_MUST_ON = 1 << 1;
    }
}

/// One value per fusion type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FusionTypeMap<T> {
    /// Value for [`FusionType::Graph`]
    pub graph: T,
    /// Value for [`FusionType::Buffer`]
    pub buffer: T,
}

impl<T> FusionTypeMap<T> {
    /// Build from a constructor called once per fusion type
    pub fn from_fn(mut f: impl FnMut(FusionType) -> T) -> Self {
        Self {
            graph: f(FusionType::Graph),
            buffer: f(FusionType::Buffer),
        }
    }

    /// Value for a fusion type
    pub fn get(&self, fusion_type: FusionType) -> &T {
        match fusion_type {
            FusionType::Graph => &self.graph,
            FusionType::Buffer => &self.buffer,
        }
    }

    /// Mutable value for a fusion type
    pub fn get_mut(&mut self, fusion_type: FusionType) -> &mut T {
        match fusion_type {
            FusionType::Graph => &mut self.graph,
            FusionType::Buffer => &mut self.buffer,
        }
    }

    /// Iterate `(fusion_type, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (FusionType, &T)> {
        [(FusionType::Graph, &self.graph), (FusionType::Buffer, &self.buffer)].into_iter()
    }

    /// Apply `f` per fusion type, short-circuiting on error
    pub fn try_map<U, E>(
        &self,
        mut f: impl FnMut(FusionType, &T) -> Result<U, E>,
    ) -> Result<FusionTypeMap<U>, E> {
        Ok(FusionTypeMap {
            graph: f(FusionType::Graph, &self.graph)?,
            buffer: f(FusionType::Buffer, &self.buffer)?,
        })
    }
}

/// Registration-time identity of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassDescriptor {
    /// Pass name, unique within its fusion type
    pub name: String,
    /// Who supplied the pass
    pub owner: OwnerType,
    /// Namespace the pass is scheduled in
    pub fusion_type: FusionType,
    /// Priority tier
    pub level: PriorityLevel,
    /// Explicit priority; allocated from the default band when `None`
    pub priority: Option<u32>,
    /// Static attributes
    pub attrs: PassAttrs,
    /// Pipeline stage the pass runs in
    pub stage: Stage,
}

impl PassDescriptor {
    /// A built-in graph pass running in [`Stage::OriginalFusion`]
    pub fn graph(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: OwnerType::BuiltIn,
            fusion_type: FusionType::Graph,
            level: PriorityLevel::Pass,
            priority: None,
            attrs: PassAttrs::empty(),
            stage: Stage::OriginalFusion,
        }
    }

    /// A built-in buffer fusion rule running in [`Stage::BufferFusionMatch`]
    pub fn buffer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: OwnerType::BuiltIn,
            fusion_type: FusionType::Buffer,
            level: PriorityLevel::Rule,
            priority: None,
            attrs: PassAttrs::empty(),
            stage: Stage::BufferFusionMatch,
        }
    }

    /// Mark as user supplied
    pub fn custom(mut self) -> Self {
        self.owner = OwnerType::Custom;
        self
    }

    /// Mark as shipped with the compiler
    pub fn builtin(mut self) -> Self {
        self.owner = OwnerType::BuiltIn;
        self
    }

    /// Set the priority tier
    pub fn level(mut self, level: PriorityLevel) -> Self {
        self.level = level;
        self
    }

    /// Set an explicit priority
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the attribute mask
    pub fn attrs(mut self, attrs: PassAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    /// Set the pipeline stage (graph passes only)
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// Whether the forbidden-closed attribute bit is set
    pub fn is_forbidden_closed(&self) -> bool {
        self.attrs.contains(PassAttrs::FORBIDDEN_CLOSED)
    }
}
