use std::fmt;

use rustc_hash::FxHashSet;

use crate::config::{FusionTables, SwitchLookup};
use crate::pass::{FusionType, PassAttrs, PassDescriptor};

use super::providers::{LevelSignal, LicenseProvider, OptionProvider, FORBIDDEN_CLOSE_PASS_KEY};

/// Execution scene of one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scene {
    /// Whole-graph compilation
    #[default]
    Graph,
    /// Single-operator compilation; fusion is suppressed
    SingleOp,
}

/// Branch of the resolution chain that decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Option override for the pass name
    OptionOverride,
    /// Pass is in the exceptional set
    Exceptional,
    /// `forbidden_close_pass` override on a forbidden-closed pass
    ForbiddenCloseOverride,
    /// Level-1 signal disables passes
    LevelDisabled,
    /// Forbidden-closed passes default to on
    ForbiddenClosed,
    /// License does not permit the pass
    LicenseDenied,
    /// Switch map entry for the pass
    SwitchExplicit,
    /// Switch map `ALL` entry
    SwitchWildcard,
    /// Single-op scene
    SingleOpScene,
    /// Nothing else applied
    Default,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rule::OptionOverride => "option override",
            Rule::Exceptional => "exceptional set",
            Rule::ForbiddenCloseOverride => "forbidden-close override",
            Rule::LevelDisabled => "level-1 disabled",
            Rule::ForbiddenClosed => "forbidden closed",
            Rule::LicenseDenied => "license",
            Rule::SwitchExplicit => "switch entry",
            Rule::SwitchWildcard => "switch wildcard",
            Rule::SingleOpScene => "single-op scene",
            Rule::Default => "default",
        };
        f.write_str(s)
    }
}

/// Result of resolving one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the pass may run
    pub enabled: bool,
    /// Branch that decided
    pub rule: Rule,
}

impl Decision {
    fn new(enabled: bool, rule: Rule) -> Self {
        Self { enabled, rule }
    }
}

/// Decides whether a pass may run in the current invocation
///
/// The chain is evaluated in order and the first matching branch decides:
///
/// 1. option override for the pass name
/// 2. exceptional set: on
/// 3. `forbidden_close_pass` override, if the pass is forbidden-closed
/// 4. level-1 signal: off
/// 5. forbidden-closed: on
/// 6. active license without the pass: off
/// 7. switch map entry, then its `ALL` entry
/// 8. single-op scene: on only with [`PassAttrs::SINGLE_OP_SCENE_MUST_ON`]
/// 9. on
pub struct SwitchResolver<'a> {
    tables: &'a FusionTables,
    options: &'a dyn OptionProvider,
    forbidden_closed: &'a FxHashSet<String>,
    license: &'a dyn LicenseProvider,
}

impl<'a> SwitchResolver<'a> {
    /// Resolve against installed tables, using their license allow-list
    pub fn new(
        tables: &'a FusionTables,
        options: &'a dyn OptionProvider,
        forbidden_closed: &'a FxHashSet<String>,
    ) -> Self {
        Self {
            tables,
            options,
            forbidden_closed,
            license: &tables.license,
        }
    }

    /// Use another license provider
    pub fn with_license(mut self, license: &'a dyn LicenseProvider) -> Self {
        self.license = license;
        self
    }

    /// Resolve one pass
    pub fn resolve(&self, name: &str, fusion_type: FusionType, attrs: PassAttrs, scene: Scene) -> Decision {
        if let Some(enabled) = self.options.try_get_override(name) {
            return Decision::new(enabled, Rule::OptionOverride);
        }
        if self.in_exceptional_set(name) {
            return Decision::new(true, Rule::Exceptional);
        }

        let forbidden_closed = self.is_forbidden_closed(name, attrs);
        if forbidden_closed {
            if let Some(enabled) = self.options.try_get_override(FORBIDDEN_CLOSE_PASS_KEY) {
                return Decision::new(enabled, Rule::ForbiddenCloseOverride);
            }
        }
        if self.options.level_signal() == LevelSignal::O1PassesDisabled {
            return Decision::new(false, Rule::LevelDisabled);
        }
        if forbidden_closed {
            return Decision::new(true, Rule::ForbiddenClosed);
        }
        if self.is_license_controlled(name) {
            return Decision::new(false, Rule::LicenseDenied);
        }

        match self.tables.switch_map(fusion_type).lookup(name) {
            Some(SwitchLookup::Explicit(enabled)) => return Decision::new(enabled, Rule::SwitchExplicit),
            Some(SwitchLookup::Wildcard(enabled)) => return Decision::new(enabled, Rule::SwitchWildcard),
            None => {}
        }

        if scene == Scene::SingleOp {
            let must_on = attrs.contains(PassAttrs::SINGLE_OP_SCENE_MUST_ON);
            return Decision::new(must_on, Rule::SingleOpScene);
        }
        Decision::new(true, Rule::Default)
    }

    /// Resolve a registered pass
    pub fn resolve_pass(&self, desc: &PassDescriptor, scene: Scene) -> Decision {
        self.resolve(&desc.name, desc.fusion_type, desc.attrs, scene)
    }

    /// Whether the pass may run
    pub fn is_enabled(&self, name: &str, fusion_type: FusionType, attrs: PassAttrs, scene: Scene) -> bool {
        self.resolve(name, fusion_type, attrs, scene).enabled
    }

    /// True when an active license does not permit the pass
    pub fn is_license_controlled(&self, name: &str) -> bool {
        !self.license.is_allow_all() && !self.license.contains(name)
    }

    /// True when the pass is on the built-in list or carries the attribute bit
    pub fn is_forbidden_closed(&self, name: &str, attrs: PassAttrs) -> bool {
        attrs.contains(PassAttrs::FORBIDDEN_CLOSED) || self.forbidden_closed.contains(name)
    }

    /// True when the pass is in the exceptional set
    pub fn in_exceptional_set(&self, name: &str) -> bool {
        self.tables.exceptional.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExceptionalSet, LicenseAllowList, SwitchMap};
    use crate::switch::OptimizationOptions;

    fn tables_with(graph_switches: &[(&str, bool)]) -> FusionTables {
        let mut tables = FusionTables::default();
        tables.switches.graph = graph_switches
            .iter()
            .map(|(name, enabled)| (name.to_string(), *enabled))
            .collect::<SwitchMap>();
        tables
    }

    fn resolve(tables: &FusionTables, options: &OptimizationOptions, name: &str, attrs: PassAttrs) -> Decision {
        let forbidden = FxHashSet::default();
        SwitchResolver::new(tables, options, &forbidden).resolve(name, FusionType::Graph, attrs, Scene::Graph)
    }

    #[test]
    fn test_exceptional_beats_switch_off() {
        let mut tables = tables_with(&[("Bar", false)]);
        tables.exceptional = ExceptionalSet::from_iter(["Bar"]);
        let decision = resolve(&tables, &OptimizationOptions::new(), "Bar", PassAttrs::empty());
        assert_eq!(decision, Decision::new(true, Rule::Exceptional));
    }

    #[test]
    fn test_license_denies() {
        let mut tables = tables_with(&[]);
        tables.license = LicenseAllowList::only(["Other"]);
        let decision = resolve(&tables, &OptimizationOptions::new(), "Baz", PassAttrs::empty());
        assert_eq!(decision, Decision::new(false, Rule::LicenseDenied));
    }

    #[test]
    fn test_forbidden_closed_beats_license() {
        let mut tables = tables_with(&[]);
        tables.license = LicenseAllowList::only(["Other"]);
        let decision = resolve(&tables, &OptimizationOptions::new(), "Baz", PassAttrs::FORBIDDEN_CLOSED);
        assert_eq!(decision, Decision::new(true, Rule::ForbiddenClosed));
    }

    #[test]
    fn test_single_op_scene() {
        let tables = tables_with(&[]);
        let options = OptimizationOptions::new();
        let forbidden = FxHashSet::default();
        let resolver = SwitchResolver::new(&tables, &options, &forbidden);

        let plain = resolver.resolve("Qux", FusionType::Graph, PassAttrs::empty(), Scene::SingleOp);
        assert_eq!(plain, Decision::new(false, Rule::SingleOpScene));

        let must_on = resolver.resolve(
            "Qux",
            FusionType::Graph,
            PassAttrs::SINGLE_OP_SCENE_MUST_ON,
            Scene::SingleOp,
        );
        assert!(must_on.enabled);
    }

    #[test]
    fn test_switch_entry_precedes_single_op_scene() {
        let tables = tables_with(&[("Qux", true)]);
        let options = OptimizationOptions::new();
        let forbidden = FxHashSet::default();
        let resolver = SwitchResolver::new(&tables, &options, &forbidden);
        assert!(resolver.is_enabled("Qux", FusionType::Graph, PassAttrs::empty(), Scene::SingleOp));
    }

    #[test]
    fn test_option_override_first() {
        let mut tables = tables_with(&[]);
        tables.exceptional = ExceptionalSet::from_iter(["A"]);
        let options = OptimizationOptions::new().with_override("A", false);
        assert_eq!(
            resolve(&tables, &options, "A", PassAttrs::empty()),
            Decision::new(false, Rule::OptionOverride)
        );
    }

    #[test]
    fn test_forbidden_close_override_and_level() {
        let tables = tables_with(&[]);
        let builtin_list: FxHashSet<String> = ["Fc".to_string()].into_iter().collect();

        let options = OptimizationOptions::new()
            .with_override(FORBIDDEN_CLOSE_PASS_KEY, false)
            .with_level(LevelSignal::O1PassesDisabled);
        let resolver = SwitchResolver::new(&tables, &options, &builtin_list);
        assert_eq!(
            resolver.resolve("Fc", FusionType::Graph, PassAttrs::empty(), Scene::Graph),
            Decision::new(false, Rule::ForbiddenCloseOverride)
        );
        assert_eq!(
            resolver.resolve("Plain", FusionType::Graph, PassAttrs::empty(), Scene::Graph),
            Decision::new(false, Rule::LevelDisabled)
        );

        let level_only = OptimizationOptions::new().with_level(LevelSignal::O1PassesDisabled);
        let resolver = SwitchResolver::new(&tables, &level_only, &builtin_list);
        assert!(!resolver.is_enabled("Fc", FusionType::Graph, PassAttrs::empty(), Scene::Graph));
    }

    #[test]
    fn test_wildcard_and_default() {
        let tables = tables_with(&[("ALL", false), ("Keep", true)]);
        let options = OptimizationOptions::new();
        assert_eq!(
            resolve(&tables, &options, "Other", PassAttrs::empty()),
            Decision::new(false, Rule::SwitchWildcard)
        );
        assert_eq!(
            resolve(&tables, &options, "Keep", PassAttrs::empty()),
            Decision::new(true, Rule::SwitchExplicit)
        );

        let empty = tables_with(&[]);
        assert_eq!(
            resolve(&empty, &options, "Other", PassAttrs::empty()),
            Decision::new(true, Rule::Default)
        );
    }

    #[test]
    fn test_fusion_types_are_separate() {
        let tables = tables_with(&[("P", false)]);
        let options = OptimizationOptions::new();
        let forbidden = FxHashSet::default();
        let resolver = SwitchResolver::new(&tables, &options, &forbidden);
        assert!(resolver.is_enabled("P", FusionType::Buffer, PassAttrs::empty(), Scene::Graph));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let mut tables = tables_with(&[("A", false), ("ALL", true)]);
        tables.license = LicenseAllowList::only(["A", "B"]);
        let options = OptimizationOptions::new();
        let forbidden = FxHashSet::default();
        let resolver = SwitchResolver::new(&tables, &options, &forbidden);

        for name in ["A", "B", "C"] {
            let first = resolver.resolve(name, FusionType::Graph, PassAttrs::empty(), Scene::Graph);
            for _ in 0..10 {
                assert_eq!(resolver.resolve(name, FusionType::Graph, PassAttrs::empty(), Scene::Graph), first);
            }
        }
    }

    #[test]
    fn test_license_override() {
        let tables = tables_with(&[]);
        let options = OptimizationOptions::new();
        let forbidden = FxHashSet::default();
        let license = LicenseAllowList::only(["X"]);
        let resolver = SwitchResolver::new(&tables, &options, &forbidden).with_license(&license);
        assert!(resolver.is_license_controlled("Y"));
        assert!(!resolver.is_license_controlled("X"));
    }
}
