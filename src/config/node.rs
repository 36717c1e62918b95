//! Duplicate-preserving JSON tree
//!
//! `serde_json::Value` keeps only the last of two equal keys. Priority tables
//! must reject duplicate pass names, so configuration text is decoded into
//! [`ConfigNode`], whose objects keep every entry in file order.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

/// JSON value with ordered, duplicate-preserving objects
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigNode {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Any JSON number
    Number(serde_json::Number),
    /// String
    String(String),
    /// Array
    Array(Vec<ConfigNode>),
    /// Object entries in file order, duplicates included
    Object(Vec<(String, ConfigNode)>),
}

impl ConfigNode {
    /// Parse JSON text
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Name of the JSON kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigNode::Null => "null",
            ConfigNode::Bool(_) => "a boolean",
            ConfigNode::Number(_) => "a number",
            ConfigNode::String(_) => "a string",
            ConfigNode::Array(_) => "an array",
            ConfigNode::Object(_) => "an object",
        }
    }

    /// Object entries, if this is an object
    pub fn as_object(&self) -> Option<&[(String, ConfigNode)]> {
        match self {
            ConfigNode::Object(entries) => Some(entries),
            _ => None,
        }
    }

    /// Array items, if this is an array
    pub fn as_array(&self) -> Option<&[ConfigNode]> {
        match self {
            ConfigNode::Array(items) => Some(items),
            _ => None,
        }
    }

    /// String content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigNode::String(s) => Some(s),
            _ => None,
        }
    }
}

struct ConfigNodeVisitor;

impl<'de> Visitor<'de> for ConfigNodeVisitor {
    type Value = ConfigNode;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ConfigNode, E> {
        serde_json::Number::from_f64(v)
            .map(ConfigNode::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E>(self, v: &str) -> Result<ConfigNode, E> {
        Ok(ConfigNode::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<ConfigNode, E> {
        Ok(ConfigNode::String(v))
    }

    fn visit_unit<E>(self) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Null)
    }

    fn visit_none<E>(self) -> Result<ConfigNode, E> {
        Ok(ConfigNode::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<ConfigNode, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ConfigNode, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ConfigNode::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ConfigNode, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, ConfigNode>()? {
            entries.push((key, value));
        }
        Ok(ConfigNode::Object(entries))
    }
}

impl<'de> Deserialize<'de> for ConfigNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConfigNodeVisitor)
    }
}
