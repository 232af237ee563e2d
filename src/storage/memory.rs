use crate::error::StoreError;

use std::collections::HashMap;

/// A node's local key-value table. Knows nothing about replication.
#[derive(Debug, Default, Clone)]
pub struct LocalStore {
    data: HashMap<String, String>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new key; an existing key is left untouched.
    pub fn create(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.data.contains_key(key) {
            return Err(StoreError::KeyExists(key.to_string()));
        }
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn read(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn update(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        match self.data.get_mut(key) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(())
            }
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    pub fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        self.data
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of every key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
