//! Per-fusion-type switch tables
//!
//! A [`SwitchMap`] maps pass names (and the wildcard [`WILDCARD`]) to on/off.
//! Sources are combined with [`SwitchMap::merge_layers`]: layers are applied
//! in precedence order and a later layer only fills names that no earlier
//! layer set.

use rustc_hash::FxHashMap;

/// Wildcard key matching every pass of a fusion type
pub const WILDCARD: &str = "ALL";

/// Parse a switch literal
pub fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" => Some(true),
        "off" => Some(false),
        _ => None,
    }
}

/// Outcome of a switch lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchLookup {
    /// The pass has its own entry
    Explicit(bool),
    /// Only the wildcard entry applies
    Wildcard(bool),
}

impl SwitchLookup {
    /// The looked-up value
    pub fn value(self) -> bool {
        match self {
            SwitchLookup::Explicit(v) | SwitchLookup::Wildcard(v) => v,
        }
    }
}

/// Pass name → enabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchMap {
    entries: FxHashMap<String, bool>,
}

impl SwitchMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn insert(&mut self, name: impl Into<String>, enabled: bool) -> Option<bool> {
        self.entries.insert(name.into(), enabled)
    }

    /// Set a value only when the name is absent; returns whether it was set
    pub fn insert_if_absent(&mut self, name: &str, enabled: bool) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), enabled);
        true
    }

    /// Explicit entry for a pass
    pub fn explicit(&self, name: &str) -> Option<bool> {
        self.entries.get(name).copied()
    }

    /// Wildcard entry
    pub fn wildcard(&self) -> Option<bool> {
        self.entries.get(WILDCARD).copied()
    }

    /// Explicit entry, else wildcard
    pub fn lookup(&self, name: &str) -> Option<SwitchLookup> {
        self.explicit(name)
            .map(SwitchLookup::Explicit)
            .or_else(|| self.wildcard().map(SwitchLookup::Wildcard))
    }

    /// Number of entries (wildcard included)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Fill gaps from `other`; existing entries are never overwritten
    pub fn fill_from(&mut self, other: &SwitchMap) {
        for (name, enabled) in other.iter() {
            self.insert_if_absent(name, enabled);
        }
    }

    /// Merge layers, highest precedence first
    pub fn merge_layers<'a>(layers: impl IntoIterator<Item = &'a SwitchMap>) -> SwitchMap {
        let mut merged = SwitchMap::new();
        for layer in layers {
            merged.fill_from(layer);
        }
        merged
    }
}

impl FromIterator<(String, bool)> for SwitchMap {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
