use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{Error, Result};

/// An insertion-ordered string map with later-wins semantics.
///
/// Overriding an existing key keeps its original position, so merging
/// `{a:1, b:2}` with `{b:3}` yields `{a:1, b:3}`.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct PropertyMap {
    entries: Vec<(String, String)>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Apply every entry of `other` on top of this map.
    pub fn merge(&mut self, other: PropertyMap) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse a user-supplied `KEY1=VALUE1,KEY2=VALUE2` list.
    ///
    /// Entries are split on `,` and then on the first `=`, so values may
    /// contain `=` but not `,`. Blank input yields an empty map.
    pub fn parse_key_values(input: &str) -> Result<Self> {
        let mut map = PropertyMap::new();
        for entry in input.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| Error::validation(format!("expected KEY=VALUE, got '{entry}'")))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::validation(format!("missing key in '{entry}'")));
            }
            map.insert(key, value.trim());
        }
        Ok(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for PropertyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
