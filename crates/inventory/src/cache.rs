//! Concurrent key/value cache used for pipeline, module and host scopes.
//!
//! Entries are JSON values so that facts computed by one step can be read
//! back by any other step without sharing concrete Rust types.

use crate::error::{Error, Result};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// An internally synchronized string → value store.
///
/// Safe to share between worker threads behind an `Arc`. Entries are never
/// evicted implicitly; they live as long as the cache itself.
#[derive(Debug, Default)]
pub struct Cache {
    entries: DashMap<String, Value>,
}

impl Cache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Get a value and deserialize it into `T`.
    ///
    /// Fails with [`Error::KeyNotFound`] when the key is absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key).ok_or_else(|| Error::key_not_found(key))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Store a value, replacing any previous entry
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Serialize `value` and store it
    pub fn set_serialized<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.entries.insert(key.into(), value);
        Ok(())
    }

    /// Return the value under `key`, computing and storing it first if absent.
    ///
    /// The computation runs at most once per key even when several workers
    /// race on the same entry.
    pub fn get_or_insert_with<F>(&self, key: impl Into<String>, compute: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        self.entries
            .entry(key.into())
            .or_insert_with(compute)
            .value()
            .clone()
    }

    /// Whether an entry exists
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove an entry, returning its value
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// A point-in-time copy of every entry as one mapping document
    pub fn snapshot(&self) -> Value {
        let mut map = Map::new();
        for key in self.keys() {
            if let Some(value) = self.get(&key) {
                map.insert(key, value);
            }
        }
        Value::Object(map)
    }
}
