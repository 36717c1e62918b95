//! Parsed configuration tables
//!
//! [`FusionTables`] is the immutable snapshot installed by one configuration
//! load: merged switch maps, merged priority tables, the exceptional set and
//! the license allow-list.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::error::ConfigError;
use crate::pass::{FusionType, FusionTypeMap, OwnerType, PriorityLevel};

use super::legacy::parse_legacy;
use super::license::LicenseAllowList;
use super::modern::{parse_modern, ModernConfig};
use super::switch_map::SwitchMap;

/// One configured priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityEntry {
    /// Priority value (lower runs earlier)
    pub priority: u32,
    /// Owner of the file that declared it
    pub owner: OwnerType,
    /// Tier it was declared under
    pub level: PriorityLevel,
}

/// Pass name → configured priority, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityTable {
    entries: IndexMap<String, PriorityEntry>,
}

impl PriorityTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an entry only when the name is absent; returns whether it was set
    pub fn insert_if_absent(&mut self, name: &str, entry: PriorityEntry) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), entry);
        true
    }

    /// Entry for a pass
    pub fn get(&self, name: &str) -> Option<&PriorityEntry> {
        self.entries.get(name)
    }

    /// Check if a pass has an entry
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Name holding a priority value, if any
    pub fn holder_of(&self, priority: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, e)| e.priority == priority)
            .map(|(name, _)| name.as_str())
    }

    /// Iterate entries in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PriorityEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Custom entries first, built-in entries only fill gaps
    pub fn merge(custom: &PriorityTable, builtin: &PriorityTable) -> PriorityTable {
        let mut merged = custom.clone();
        for (name, entry) in builtin.iter() {
            merged.insert_if_absent(name, *entry);
        }
        merged
    }
}

/// Passes forced on regardless of the ordinary switch chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionalSet {
    names: FxHashSet<String>,
}

impl ExceptionalSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pass
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    /// Check membership
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Union with another set
    pub fn extend_from(&mut self, other: &ExceptionalSet) {
        self.names.extend(other.names.iter().cloned());
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ExceptionalSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Raw text of each configuration source, with the label used in errors
#[derive(Debug, Clone, Copy, Default)]
pub struct TableInputs<'a> {
    /// Legacy `name:on/off` switch file
    pub legacy: Option<(&'a str, &'a str)>,
    /// Custom modern JSON
    pub custom: Option<(&'a str, &'a str)>,
    /// Built-in modern JSON
    pub builtin: Option<(&'a str, &'a str)>,
    /// License allow-list
    pub license: Option<(&'a str, &'a str)>,
}

/// Immutable tables installed by one configuration load
#[derive(Debug, Clone, Default)]
pub struct FusionTables {
    /// Merged switch maps
    pub switches: FusionTypeMap<SwitchMap>,
    /// Merged priority tables
    pub priorities: FusionTypeMap<PriorityTable>,
    /// Exceptional passes from both modern files
    pub exceptional: ExceptionalSet,
    /// License allow-list
    pub license: LicenseAllowList,
    /// Load counter value when these tables were installed (0 = never loaded)
    pub generation: u64,
}

impl FusionTables {
    /// Parse every present source and merge the results
    ///
    /// Nothing is returned unless every source parses.
    pub fn parse(inputs: TableInputs<'_>) -> Result<Self, ConfigError> {
        let legacy = inputs
            .legacy
            .map(|(text, file)| parse_legacy(text, file))
            .transpose()?;
        let custom = inputs
            .custom
            .map(|(text, file)| parse_modern(text, file, OwnerType::Custom))
            .transpose()?;
        let builtin = inputs
            .builtin
            .map(|(text, file)| parse_modern(text, file, OwnerType::BuiltIn))
            .transpose()?;
        let license = inputs
            .license
            .map(|(text, _)| LicenseAllowList::parse(text))
            .unwrap_or_default();

        Ok(Self::merge(legacy.as_ref(), custom.as_ref(), builtin.as_ref(), license))
    }

    /// Merge parsed sources: legacy, then custom, then built-in
    pub fn merge(
        legacy: Option<&SwitchMap>,
        custom: Option<&ModernConfig>,
        builtin: Option<&ModernConfig>,
        license: LicenseAllowList,
    ) -> Self {
        let empty = ModernConfig::default();
        let custom = custom.unwrap_or(&empty);
        let builtin = builtin.unwrap_or(&empty);

        let switches = FusionTypeMap::from_fn(|ft| {
            let layers = legacy
                .into_iter()
                .chain([custom.switches.get(ft), builtin.switches.get(ft)]);
            SwitchMap::merge_layers(layers)
        });

        let priorities = FusionTypeMap::from_fn(|ft| {
            PriorityTable::merge(custom.priorities.get(ft), builtin.priorities.get(ft))
        });

        let mut exceptional = custom.exceptional.clone();
        exceptional.extend_from(&builtin.exceptional);

        Self {
            switches,
            priorities,
            exceptional,
            license,
            generation: 0,
        }
    }

    /// Switch map of a fusion type
    pub fn switch_map(&self, fusion_type: FusionType) -> &SwitchMap {
        self.switches.get(fusion_type)
    }

    /// Priority table of a fusion type
    pub fn priority_table(&self, fusion_type: FusionType) -> &PriorityTable {
        self.priorities.get(fusion_type)
    }
}
