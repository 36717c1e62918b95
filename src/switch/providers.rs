//! External inputs of switch resolution

use rustc_hash::FxHashMap;

use crate::config::switch_map::parse_switch;

/// Option key whose override applies to every forbidden-closed pass
pub const FORBIDDEN_CLOSE_PASS_KEY: &str = "forbidden_close_pass";

/// License allow-list lookup
pub trait LicenseProvider: Send + Sync {
    /// True when the license places no restriction
    fn is_allow_all(&self) -> bool;

    /// True when the license permits the pass
    fn contains(&self, pass_name: &str) -> bool;
}

/// Optimization-level signal from the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LevelSignal {
    /// Ordinary resolution
    #[default]
    Normal,
    /// Level 1: every pass not forced on is disabled
    O1PassesDisabled,
}

/// Per-invocation option overrides
pub trait OptionProvider: Send + Sync {
    /// Override for a key (a pass name or [`FORBIDDEN_CLOSE_PASS_KEY`])
    fn try_get_override(&self, key: &str) -> Option<bool>;

    /// Current optimization-level signal
    fn level_signal(&self) -> LevelSignal {
        LevelSignal::Normal
    }
}

/// Map-backed [`OptionProvider`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizationOptions {
    overrides: FxHashMap<String, bool>,
    level: LevelSignal,
}

impl OptimizationOptions {
    /// No overrides, normal level
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override
    pub fn with_override(mut self, key: impl Into<String>, enabled: bool) -> Self {
        self.overrides.insert(key.into(), enabled);
        self
    }

    /// Set the level signal
    pub fn with_level(mut self, level: LevelSignal) -> Self {
        self.level = level;
        self
    }

    /// Add or replace an override
    pub fn set_override(&mut self, key: impl Into<String>, enabled: bool) {
        self.overrides.insert(key.into(), enabled);
    }

    /// Parse `key:on,key:off` overrides; entries that do not parse are returned
    pub fn parse_overrides(mut self, text: &str) -> (Self, Vec<String>) {
        let mut rejected = Vec::new();
        for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.split_once(':') {
                Some((key, value)) if !key.trim().is_empty() => match parse_switch(value.trim()) {
                    Some(enabled) => self.set_override(key.trim(), enabled),
                    None => rejected.push(item.to_string()),
                },
                _ => rejected.push(item.to_string()),
            }
        }
        (self, rejected)
    }

    /// Number of overrides
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Check if there are no overrides
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl OptionProvider for OptimizationOptions {
    fn try_get_override(&self, key: &str) -> Option<bool> {
        self.overrides.get(key).copied()
    }

    fn level_signal(&self) -> LevelSignal {
        self.level
    }
}
