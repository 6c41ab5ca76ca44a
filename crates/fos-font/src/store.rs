//! Configuration store
//!
//! Hierarchical key/value store the engine reads installed fonts,
//! substitutions and system links from, and persists its catalog cache
//! into. Keys are `/`-separated paths; a missing key reads as empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{FontError, Result};

/// Typed store value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreValue {
    String(String),
    MultiString(Vec<String>),
    Dword(u32),
    Binary(Vec<u8>),
}

impl StoreValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoreValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dword(&self) -> Option<u32> {
        match self {
            StoreValue::Dword(v) => Some(*v),
            _ => None,
        }
    }

    /// Strings of a multi-string value; a plain string is one entry
    pub fn as_strings(&self) -> Option<Vec<&str>> {
        match self {
            StoreValue::MultiString(items) => Some(items.iter().map(String::as_str).collect()),
            StoreValue::String(s) => Some(vec![s.as_str()]),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            StoreValue::Binary(b) => Some(b),
            _ => None,
        }
    }
}

/// Read/write contract of the configuration store
pub trait ConfigStore: Send {
    /// Names of the direct subkeys of `key`
    fn enumerate_subkeys(&self, key: &str) -> Result<Vec<String>>;

    /// Values stored directly under `key`
    fn enumerate_values(&self, key: &str) -> Result<Vec<(String, StoreValue)>>;

    fn read_value(&self, key: &str, name: &str) -> Result<Option<StoreValue>>;

    /// Write a value, creating `key` if needed
    fn write_value(&mut self, key: &str, name: &str, value: StoreValue) -> Result<()>;

    fn create_key(&mut self, key: &str) -> Result<()>;

    /// Delete `key` and everything below it
    fn delete_key(&mut self, key: &str) -> Result<()>;

    /// Delete one value. Returns false if it did not exist.
    fn delete_value(&mut self, key: &str, name: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreNode {
    #[serde(default)]
    values: BTreeMap<String, StoreValue>,
    #[serde(default)]
    subkeys: BTreeMap<String, StoreNode>,
}

/// In-memory store, persisted as JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    root: StoreNode,
}

fn split_key(key: &str) -> impl Iterator<Item = &str> {
    key.split('/').filter(|part| !part.is_empty())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FontError::Store(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FontError::Store(e.to_string()))
    }

    fn node(&self, key: &str) -> Option<&StoreNode> {
        split_key(key).try_fold(&self.root, |node, part| node.subkeys.get(part))
    }

    fn node_mut(&mut self, key: &str) -> &mut StoreNode {
        split_key(key).fold(&mut self.root, |node, part| node.subkeys.entry(part.to_string()).or_default())
    }
}

impl ConfigStore for MemoryStore {
    fn enumerate_subkeys(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .node(key)
            .map(|node| node.subkeys.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn enumerate_values(&self, key: &str) -> Result<Vec<(String, StoreValue)>> {
        Ok(self
            .node(key)
            .map(|node| node.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn read_value(&self, key: &str, name: &str) -> Result<Option<StoreValue>> {
        Ok(self.node(key).and_then(|node| node.values.get(name).cloned()))
    }

    fn write_value(&mut self, key: &str, name: &str, value: StoreValue) -> Result<()> {
        self.node_mut(key).values.insert(name.to_string(), value);
        Ok(())
    }

    fn create_key(&mut self, key: &str) -> Result<()> {
        self.node_mut(key);
        Ok(())
    }

    fn delete_key(&mut self, key: &str) -> Result<()> {
        let mut parts: Vec<&str> = split_key(key).collect();
        let Some(last) = parts.pop() else {
            return Err(FontError::Store("cannot delete the root key".into()));
        };
        let parent = parts
            .iter()
            .try_fold(&mut self.root, |node, part| node.subkeys.get_mut(*part));
        if let Some(parent) = parent {
            parent.subkeys.remove(last);
        }
        Ok(())
    }

    fn delete_value(&mut self, key: &str, name: &str) -> Result<bool> {
        let node = split_key(key).try_fold(&mut self.root, |node, part| node.subkeys.get_mut(part));
        Ok(node.is_some_and(|node| node.values.remove(name).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read() {
        let mut store = MemoryStore::new();
        store
            .write_value("Fonts", "Sans (TrueType)", StoreValue::String("/fonts/sans.ttf".into()))
            .unwrap();
        assert_eq!(
            store.read_value("Fonts", "Sans (TrueType)").unwrap(),
            Some(StoreValue::String("/fonts/sans.ttf".into()))
        );
        assert_eq!(store.read_value("Fonts", "Missing").unwrap(), None);
        assert_eq!(store.read_value("Nowhere", "Sans").unwrap(), None);
    }

    #[test]
    fn test_subkeys_and_delete() {
        let mut store = MemoryStore::new();
        store.create_key("FontCache/Families/Sans/Regular").unwrap();
        store.create_key("FontCache/Families/Serif").unwrap();
        assert_eq!(
            store.enumerate_subkeys("FontCache/Families").unwrap(),
            vec!["Sans".to_string(), "Serif".to_string()]
        );

        store.delete_key("FontCache/Families/Sans").unwrap();
        assert_eq!(store.enumerate_subkeys("FontCache/Families").unwrap(), vec!["Serif".to_string()]);
        assert!(store.enumerate_subkeys("Missing/Key").unwrap().is_empty());
        assert!(store.delete_key("").is_err());
    }

    #[test]
    fn test_delete_value() {
        let mut store = MemoryStore::new();
        store.write_value("Fonts", "A", StoreValue::Dword(1)).unwrap();
        assert!(store.delete_value("Fonts", "A").unwrap());
        assert!(!store.delete_value("Fonts", "A").unwrap());
        assert!(!store.delete_value("Missing", "A").unwrap());
    }

    #[test]
    fn test_json_persistence() {
        let mut store = MemoryStore::new();
        store
            .write_value(
                "FontLink/SystemLink",
                "Tahoma",
                StoreValue::MultiString(vec!["msgothic.ttc,MS UI Gothic".into()]),
            )
            .unwrap();
        let json = store.to_json().unwrap();
        let restored = MemoryStore::from_json(&json).unwrap();
        assert_eq!(
            restored.read_value("FontLink/SystemLink", "Tahoma").unwrap(),
            store.read_value("FontLink/SystemLink", "Tahoma").unwrap()
        );
        assert!(MemoryStore::from_json("{ not json").is_err());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(StoreValue::Dword(5).as_dword(), Some(5));
        assert_eq!(StoreValue::String("a".into()).as_strings(), Some(vec!["a"]));
        assert_eq!(StoreValue::Binary(vec![1]).as_binary(), Some(&[1u8][..]));
        assert_eq!(StoreValue::Dword(5).as_str(), None);
    }
}
