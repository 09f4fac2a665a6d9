// Ordered `-key [value]` options shared by global, input and output blocks

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    entries: Vec<(String, Option<String>)>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `-key value`. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.insert(key.into(), Some(value.to_string()));
    }

    /// Set a value-less `-key`.
    pub fn flag(&mut self, key: impl Into<String>) {
        self.insert(key.into(), None);
    }

    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Serialize in insertion order: `-key`, then the value when there is one.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for (key, value) in &self.entries {
            args.push(format!("-{}", key.trim_start_matches('-')));
            if let Some(value) = value {
                args.push(value.clone());
            }
        }
        args
    }

    fn insert(&mut self, key: String, value: Option<String>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

impl Serialize for OptionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            match value {
                Some(value) => map.serialize_entry(key, value)?,
                None => map.serialize_entry(key, &true)?,
            }
        }
        map.end()
    }
}

/// Scalar forms an option value may take in a config or job file.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Flag(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

struct OptionMapVisitor;

impl<'de> Visitor<'de> for OptionMapVisitor {
    type Value = OptionMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a table of option values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<OptionMap, A::Error> {
        let mut options = OptionMap::new();
        while let Some((key, value)) = access.next_entry::<String, RawValue>()? {
            if key.is_empty() {
                return Err(de::Error::custom("option key must not be empty"));
            }
            match value {
                RawValue::Flag(true) => options.flag(key),
                RawValue::Flag(false) => {}
                RawValue::Int(v) => options.set(key, v),
                RawValue::Float(v) => options.set(key, v),
                RawValue::Text(v) => options.set(key, v),
            }
        }
        Ok(options)
    }
}

impl<'de> Deserialize<'de> for OptionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<OptionMap, D::Error> {
        deserializer.deserialize_map(OptionMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_args_order_and_flags() {
        let mut options = OptionMap::new();
        options.set("ss", "00:00:05");
        options.flag("re");
        options.set("t", 10);

        assert_eq!(options.to_args(), vec!["-ss", "00:00:05", "-re", "-t", "10"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut options = OptionMap::new();
        options.set("c:v", "libx264");
        options.set("crf", 23);
        options.set("c:v", "libx265");

        assert_eq!(options.to_args(), vec!["-c:v", "libx265", "-crf", "23"]);
        assert_eq!(options.get("c:v"), Some(Some("libx265")));
        assert_eq!(options.get("missing"), None);
    }

    #[test]
    fn test_leading_dash_not_doubled() {
        let mut options = OptionMap::new();
        options.flag("-y");
        assert_eq!(options.to_args(), vec!["-y"]);
    }

    #[test]
    fn test_deserialize_keeps_document_order() {
        #[derive(Deserialize)]
        struct Wrapper {
            options: OptionMap,
        }

        let wrapper: Wrapper = toml::from_str(
            r#"
[options]
"c:v" = "libx264"
crf = 23
an = true
vn = false
qscale = 2.5
"#,
        )
        .unwrap();

        assert_eq!(
            wrapper.options.to_args(),
            vec!["-c:v", "libx264", "-crf", "23", "-an", "-qscale", "2.5"]
        );
    }

    #[test]
    fn test_serialize_flags_as_true() {
        let mut options = OptionMap::new();
        options.flag("shortest");
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, r#"{"shortest":true}"#);
    }
}
