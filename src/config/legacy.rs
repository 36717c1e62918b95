//! Legacy flat switch file
//!
//! One `name:on` / `name:off` entry per line. Blank lines are skipped. The
//! format has no fusion-type separation, so the resulting map seeds both the
//! graph and buffer switch tables.

use rustc_hash::FxHashMap;

use crate::error::ConfigError;

use super::switch_map::{parse_switch, SwitchMap};

/// Parse legacy switch text
pub fn parse_legacy(text: &str, file: &str) -> Result<SwitchMap, ConfigError> {
    let mut map = SwitchMap::new();
    let mut first_seen: FxHashMap<String, usize> = FxHashMap::default();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let line_error = |reason: &'static str| ConfigError::LegacyLine {
            file: file.to_string(),
            line: line_no,
            content: raw.to_string(),
            reason,
        };

        let mut parts = raw.split(':');
        let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(line_error("expected exactly one ':'"));
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(line_error("missing pass name"));
        }
        let enabled = parse_switch(value.trim()).ok_or_else(|| line_error("expected on/off"))?;

        if first_seen.insert(name.to_string(), line_no).is_some() {
            return Err(ConfigError::LegacyDuplicate {
                file: file.to_string(),
                line: line_no,
                name: name.to_string(),
            });
        }
        map.insert(name, enabled);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy() {
        let text = "FooFusionPass:on\n\n  BarFusionPass : off \r\n";
        let map = parse_legacy(text, "switch.cfg").unwrap();

        assert_eq!(map.explicit("FooFusionPass"), Some(true));
        assert_eq!(map.explicit("BarFusionPass"), Some(false));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_missing_colon() {
        let err = parse_legacy("Foo on", "switch.cfg").unwrap_err();
        assert!(matches!(err, ConfigError::LegacyLine { line: 1, .. }));
    }

    #[test]
    fn test_two_colons() {
        let err = parse_legacy("ok:on\nFoo:on:off", "switch.cfg").unwrap_err();
        assert!(matches!(err, ConfigError::LegacyLine { line: 2, .. }));
        assert!(err.to_string().contains("switch.cfg:2"));
    }

    #[test]
    fn test_bad_value() {
        let err = parse_legacy("Foo:yes", "switch.cfg").unwrap_err();
        assert!(err.to_string().contains("on/off"));
    }

    #[test]
    fn test_duplicate_name() {
        let err = parse_legacy("Foo:on\nBar:on\nFoo:off", "switch.cfg").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::LegacyDuplicate { line: 3, ref name, .. } if name == "Foo"
        ));
    }
}
