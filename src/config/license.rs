//! License allow-list
//!
//! The allow-list names the passes a license permits, separated by commas or
//! newlines. The single entry `ALL` (or an absent file) allows every pass.

use rustc_hash::FxHashSet;

use crate::switch::LicenseProvider;

use super::switch_map::WILDCARD;

/// Passes permitted by the active license
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseAllowList {
    allow_all: bool,
    detail: FxHashSet<String>,
}

impl Default for LicenseAllowList {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl LicenseAllowList {
    /// No restriction
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            detail: FxHashSet::default(),
        }
    }

    /// Only the given passes
    pub fn only<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            allow_all: false,
            detail: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse allow-list text
    pub fn parse(text: &str) -> Self {
        let names: Vec<&str> = text
            .split([',', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if names.iter().any(|n| *n == WILDCARD) {
            return Self::allow_all();
        }
        Self::only(names)
    }

    /// Number of explicitly allowed passes
    pub fn len(&self) -> usize {
        self.detail.len()
    }

    /// Check if no pass is listed
    pub fn is_empty(&self) -> bool {
        self.detail.is_empty()
    }
}

impl LicenseProvider for LicenseAllowList {
    fn is_allow_all(&self) -> bool {
        self.allow_all
    }

    fn contains(&self, pass_name: &str) -> bool {
        self.allow_all || self.detail.contains(pass_name)
    }
}
