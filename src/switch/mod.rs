//! Per-invocation pass enablement
//!
//! [`SwitchResolver`] combines the installed switch tables with the
//! caller's option overrides, the optimization-level signal and the license
//! allow-list. Resolution is a pure function of those inputs.

mod providers;
mod resolver;

pub use providers::{LevelSignal, LicenseProvider, OptimizationOptions, OptionProvider, FORBIDDEN_CLOSE_PASS_KEY};
pub use resolver::{Decision, Rule, Scene, SwitchResolver};
