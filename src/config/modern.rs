//! Nested `Switch` / `Priority` JSON schema
//!
//! ```json
//! {
//!   "Switch": {
//!     "GraphFusion": { "ALL": "on", "ConvBiasFusionPass": "off" },
//!     "UBFusion": { "TbeEltwiseFusionPass": "on" }
//!   },
//!   "Priority": {
//!     "GraphFusion": { "Top": { "ConvBiasFusionPass": "3010" } }
//!   },
//!   "ExceptionalPassOfO1Level": ["CastRemovePass"]
//! }
//! ```
//!
//! Every priority is checked against the band of the file's owner type and
//! the level it is declared under.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::error::ConfigError;
use crate::pass::{FusionType, FusionTypeMap, OwnerType, PriorityLevel};
use crate::priority::band_of;

use super::node::ConfigNode;
use super::switch_map::{parse_switch, SwitchMap};
use super::tables::{ExceptionalSet, PriorityEntry, PriorityTable};

/// Top-level key of the switch section
pub const SWITCH_KEY: &str = "Switch";
/// Top-level key of the priority section
pub const PRIORITY_KEY: &str = "Priority";
/// Top-level key of the exceptional pass list
pub const EXCEPTIONAL_KEY: &str = "ExceptionalPassOfO1Level";

const TOP_LEVEL_KEYS: &str = "Switch, Priority, ExceptionalPassOfO1Level";
const FUSION_TYPE_KEYS: &str = "GraphFusion, UBFusion";
const LEVEL_KEYS: &str = "Top, Main, Down";

/// Tables parsed from one modern configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModernConfig {
    /// Switch entries per fusion type
    pub switches: FusionTypeMap<SwitchMap>,
    /// Priority entries per fusion type
    pub priorities: FusionTypeMap<PriorityTable>,
    /// Exceptional passes
    pub exceptional: ExceptionalSet,
}

/// Parse one modern configuration file owned by `owner`
pub fn parse_modern(text: &str, file: &str, owner: OwnerType) -> Result<ModernConfig, ConfigError> {
    let root = ConfigNode::parse(text).map_err(|source| ConfigError::Json {
        file: file.to_string(),
        source,
    })?;

    let parser = ModernParser { file, owner };
    let entries = parser.object(&root, "<root>")?;

    let mut config = ModernConfig::default();
    for (key, value) in entries {
        match key.as_str() {
            SWITCH_KEY => parser.switch_section(value, &mut config.switches)?,
            PRIORITY_KEY => parser.priority_section(value, &mut config.priorities)?,
            EXCEPTIONAL_KEY => parser.exceptional(value, &mut config.exceptional)?,
            _ => return Err(parser.unknown_key("<root>", key, TOP_LEVEL_KEYS)),
        }
    }

    Ok(config)
}

struct ModernParser<'a> {
    file: &'a str,
    owner: OwnerType,
}

impl ModernParser<'_> {
    fn object<'n>(
        &self,
        node: &'n ConfigNode,
        key_path: &str,
    ) -> Result<&'n [(String, ConfigNode)], ConfigError> {
        node.as_object().ok_or_else(|| ConfigError::Shape {
            file: self.file.to_string(),
            key_path: key_path.to_string(),
            expected: "an object",
            found: node.kind(),
        })
    }

    fn string<'n>(&self, node: &'n ConfigNode, key_path: &str) -> Result<&'n str, ConfigError> {
        node.as_str().ok_or_else(|| ConfigError::Shape {
            file: self.file.to_string(),
            key_path: key_path.to_string(),
            expected: "a string",
            found: node.kind(),
        })
    }

    fn unknown_key(&self, parent: &str, key: &str, allowed: &'static str) -> ConfigError {
        ConfigError::UnknownKey {
            file: self.file.to_string(),
            parent: parent.to_string(),
            key: key.to_string(),
            allowed,
        }
    }

    fn fusion_type(&self, parent: &str, key: &str) -> Result<FusionType, ConfigError> {
        FusionType::from_config_key(key).ok_or_else(|| self.unknown_key(parent, key, FUSION_TYPE_KEYS))
    }

    fn switch_section(
        &self,
        node: &ConfigNode,
        out: &mut FusionTypeMap<SwitchMap>,
    ) -> Result<(), ConfigError> {
        for (type_key, type_node) in self.object(node, SWITCH_KEY)? {
            let fusion_type = self.fusion_type(SWITCH_KEY, type_key)?;
            let type_path = format!("{SWITCH_KEY}.{type_key}");
            let map = out.get_mut(fusion_type);

            for (name, value) in self.object(type_node, &type_path)? {
                let key_path = format!("{type_path}.{name}");
                let raw = self.string(value, &key_path)?;
                let enabled = parse_switch(raw).ok_or_else(|| ConfigError::InvalidSwitchValue {
                    file: self.file.to_string(),
                    key_path: key_path.clone(),
                    value: raw.to_string(),
                })?;
                if map.insert(name.as_str(), enabled).is_some() {
                    warn!(file = self.file, key = %key_path, "duplicate switch entry, last one wins");
                }
            }
        }
        Ok(())
    }

    fn priority_section(
        &self,
        node: &ConfigNode,
        out: &mut FusionTypeMap<PriorityTable>,
    ) -> Result<(), ConfigError> {
        for (type_key, type_node) in self.object(node, PRIORITY_KEY)? {
            let fusion_type = self.fusion_type(PRIORITY_KEY, type_key)?;
            let type_path = format!("{PRIORITY_KEY}.{type_key}");
            let table = out.get_mut(fusion_type);
            // priority value -> pass name, for this fusion type in this file
            let mut values: FxHashMap<u32, String> = FxHashMap::default();

            for (level_key, level_node) in self.object(type_node, &type_path)? {
                let level = PriorityLevel::from_config_key(level_key)
                    .ok_or_else(|| self.unknown_key(&type_path, level_key, LEVEL_KEYS))?;
                let level_path = format!("{type_path}.{level_key}");
                let band = band_of(self.owner, level);
                let mut seen_in_level: FxHashSet<&str> = FxHashSet::default();

                for (name, value) in self.object(level_node, &level_path)? {
                    let key_path = format!("{level_path}.{name}");
                    if !seen_in_level.insert(name.as_str()) || table.contains(name) {
                        return Err(ConfigError::DuplicatePass {
                            file: self.file.to_string(),
                            key_path,
                        });
                    }

                    let raw = self.string(value, &key_path)?;
                    let parsed: i64 = raw.trim().parse().map_err(|_| ConfigError::InvalidPriority {
                        file: self.file.to_string(),
                        key_path: key_path.clone(),
                        value: raw.to_string(),
                    })?;
                    let priority = band.checked(parsed).ok_or_else(|| ConfigError::PriorityOutOfBand {
                        file: self.file.to_string(),
                        key_path: key_path.clone(),
                        value: parsed,
                        band,
                    })?;

                    if let Some(other) = values.insert(priority, name.clone()) {
                        return Err(ConfigError::DuplicatePriority {
                            file: self.file.to_string(),
                            key_path,
                            value: priority,
                            other,
                        });
                    }

                    table.insert_if_absent(
                        name,
                        PriorityEntry {
                            priority,
                            owner: self.owner,
                            level,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn exceptional(&self, node: &ConfigNode, out: &mut ExceptionalSet) -> Result<(), ConfigError> {
        let items = node.as_array().ok_or_else(|| ConfigError::Shape {
            file: self.file.to_string(),
            key_path: EXCEPTIONAL_KEY.to_string(),
            expected: "an array",
            found: node.kind(),
        })?;

        for (index, item) in items.iter().enumerate() {
            let name = self.string(item, &format!("{EXCEPTIONAL_KEY}[{index}]"))?;
            out.insert(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_custom(text: &str) -> Result<ModernConfig, ConfigError> {
        parse_modern(text, "custom.json", OwnerType::Custom)
    }

    #[test]
    fn test_full_document() {
        let config = parse_modern(
            r#"{
                "Switch": {
                    "GraphFusion": {"ALL": "on", "B": "off"},
                    "UBFusion": {"U": "on"}
                },
                "Priority": {
                    "GraphFusion": {"Top": {"A": "3010"}, "Down": {"B": "5000"}}
                },
                "ExceptionalPassOfO1Level": ["A"]
            }"#,
            "builtin.json",
            OwnerType::BuiltIn,
        )
        .unwrap();

        let graph = config.switches.get(FusionType::Graph);
        assert_eq!(graph.wildcard(), Some(true));
        assert_eq!(graph.explicit("B"), Some(false));
        assert_eq!(config.switches.get(FusionType::Buffer).explicit("U"), Some(true));

        let table = config.priorities.get(FusionType::Graph);
        assert_eq!(table.get("A").unwrap().priority, 3010);
        assert_eq!(table.get("B").unwrap().level, PriorityLevel::Down);
        assert!(config.exceptional.contains("A"));
    }

    #[test]
    fn test_custom_top_in_band() {
        let config = parse_custom(r#"{"Priority": {"GraphFusion": {"Top": {"MyPass": "500"}}}}"#).unwrap();
        let entry = config.priorities.get(FusionType::Graph).get("MyPass").copied().unwrap();
        assert_eq!(entry.priority, 500);
        assert_eq!(entry.owner, OwnerType::Custom);
    }

    #[test]
    fn test_custom_top_out_of_band() {
        let err = parse_custom(r#"{"Priority": {"GraphFusion": {"Top": {"MyPass": "1500"}}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::PriorityOutOfBand { value: 1500, .. }));
        assert!(err.to_string().contains("[0,1000)"));
        assert!(err.to_string().contains("Priority.GraphFusion.Top.MyPass"));
    }

    #[test]
    fn test_negative_priority_is_out_of_band() {
        let err = parse_custom(r#"{"Priority": {"UBFusion": {"Main": {"P": "-1"}}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::PriorityOutOfBand { value: -1, .. }));
    }

    #[test]
    fn test_builtin_band_differs() {
        let ok = parse_modern(
            r#"{"Priority": {"GraphFusion": {"Main": {"P": "4500"}}}}"#,
            "builtin.json",
            OwnerType::BuiltIn,
        );
        assert!(ok.is_ok());
        let err = parse_custom(r#"{"Priority": {"GraphFusion": {"Main": {"P": "4500"}}}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_duplicate_pass_in_level() {
        let err = parse_custom(r#"{"Priority": {"GraphFusion": {"Top": {"A": "1", "A": "2"}}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePass { .. }));
    }

    #[test]
    fn test_duplicate_pass_across_levels() {
        let err = parse_custom(
            r#"{"Priority": {"GraphFusion": {"Top": {"A": "1"}, "Main": {"A": "1001"}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePass { .. }));
    }

    #[test]
    fn test_same_name_in_both_fusion_types() {
        let config = parse_custom(
            r#"{"Priority": {"GraphFusion": {"Top": {"A": "1"}}, "UBFusion": {"Top": {"A": "1"}}}}"#,
        );
        assert!(config.is_ok());
    }

    #[test]
    fn test_duplicate_priority_value() {
        let err = parse_custom(r#"{"Priority": {"GraphFusion": {"Top": {"A": "7", "B": "7"}}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePriority { value: 7, ref other, .. } if other == "A"));
    }

    #[test]
    fn test_non_integer_priority() {
        for value in [r#""abc""#, r#""1.5""#, "12"] {
            let text = format!(r#"{{"Priority": {{"GraphFusion": {{"Top": {{"A": {value}}}}}}}}}"#);
            assert!(parse_custom(&text).is_err(), "accepted {value}");
        }
    }

    #[test]
    fn test_bad_switch_value() {
        let err = parse_custom(r#"{"Switch": {"GraphFusion": {"A": "enabled"}}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSwitchValue { ref value, .. } if value == "enabled"));
    }

    #[test]
    fn test_unknown_keys() {
        let top = parse_custom(r#"{"Switches": {}}"#).unwrap_err();
        assert!(matches!(top, ConfigError::UnknownKey { ref key, .. } if key == "Switches"));

        let second = parse_custom(r#"{"Switch": {"graph": {}}}"#).unwrap_err();
        assert!(matches!(second, ConfigError::UnknownKey { ref parent, .. } if parent == "Switch"));

        let level = parse_custom(r#"{"Priority": {"UBFusion": {"Middle": {}}}}"#).unwrap_err();
        assert!(matches!(level, ConfigError::UnknownKey { ref key, .. } if key == "Middle"));
    }

    #[test]
    fn test_wrong_shapes() {
        assert!(matches!(parse_custom("[]"), Err(ConfigError::Shape { .. })));
        assert!(matches!(parse_custom(r#"{"Switch": []}"#), Err(ConfigError::Shape { .. })));
        assert!(matches!(
            parse_custom(r#"{"ExceptionalPassOfO1Level": "A"}"#),
            Err(ConfigError::Shape { .. })
        ));
        assert!(matches!(
            parse_custom(r#"{"ExceptionalPassOfO1Level": [1]}"#),
            Err(ConfigError::Shape { .. })
        ));
    }

    #[test]
    fn test_malformed_json_names_file() {
        let err = parse_custom("{").unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
        assert!(err.to_string().contains("custom.json"));
    }
}
