use std::fmt;

/// Pipeline stage
///
/// Stages run in declaration order. `Done` and `Error` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Configuration (re)load and ordering rebuild
    Init,
    /// Graph preparation passes
    Prepare,
    /// First round of graph fusion
    OriginalFusion,
    /// Format and dtype judgement passes
    FormatDtypeJudge,
    /// Transfer-node insertion passes
    TransNodeInsertion,
    /// Second round of graph fusion
    SecondRoundFusion,
    /// Buffer fusion rule matching
    BufferFusionMatch,
    /// Code generation
    Compile,
    /// Post-processing after code generation
    PostProcess,
    /// Finished successfully
    Done,
    /// Aborted
    Error,
}

impl Stage {
    /// Stages that run graph fusion passes, in order
    pub const GRAPH_STAGES: [Stage; 5] = [
        Stage::Prepare,
        Stage::OriginalFusion,
        Stage::FormatDtypeJudge,
        Stage::TransNodeInsertion,
        Stage::SecondRoundFusion,
    ];

    /// Following stage on success
    pub fn next(self) -> Stage {
        match self {
            Stage::Init => Stage::Prepare,
            Stage::Prepare => Stage::OriginalFusion,
            Stage::OriginalFusion => Stage::FormatDtypeJudge,
            Stage::FormatDtypeJudge => Stage::TransNodeInsertion,
            Stage::TransNodeInsertion => Stage::SecondRoundFusion,
            Stage::SecondRoundFusion => Stage::BufferFusionMatch,
            Stage::BufferFusionMatch => Stage::Compile,
            Stage::Compile => Stage::PostProcess,
            Stage::PostProcess | Stage::Done => Stage::Done,
            Stage::Error => Stage::Error,
        }
    }

    /// Whether graph fusion passes may be registered for this stage
    pub fn is_graph_stage(self) -> bool {
        Self::GRAPH_STAGES.contains(&self)
    }

    /// Whether no further stage follows
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Error)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "Init",
            Stage::Prepare => "Prepare",
            Stage::OriginalFusion => "OriginalFusion",
            Stage::FormatDtypeJudge => "FormatDtypeJudge",
            Stage::TransNodeInsertion => "TransNodeInsertion",
            Stage::SecondRoundFusion => "SecondRoundFusion",
            Stage::BufferFusionMatch => "BufferFusionMatch",
            Stage::Compile => "Compile",
            Stage::PostProcess => "PostProcess",
            Stage::Done => "Done",
            Stage::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Stage cursor of one `optimize` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMachine {
    current: Stage,
    visited: Vec<Stage>,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMachine {
    /// Start at [`Stage::Init`]
    pub fn new() -> Self {
        Self {
            current: Stage::Init,
            visited: vec![Stage::Init],
        }
    }

    /// Current stage
    pub fn current(&self) -> Stage {
        self.current
    }

    /// Stages entered so far, in order
    pub fn visited(&self) -> &[Stage] {
        &self.visited
    }

    /// Move to the next stage and return it
    pub fn advance(&mut self) -> Stage {
        let next = self.current.next();
        if next != self.current {
            self.current = next;
            self.visited.push(next);
        }
        next
    }

    /// Enter [`Stage::Error`]
    pub fn fail(&mut self) {
        if self.current != Stage::Error {
            self.current = Stage::Error;
            self.visited.push(Stage::Error);
        }
    }
}
