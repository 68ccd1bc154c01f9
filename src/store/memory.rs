//! In-memory store backend.
//!
//! Redis-flavored semantics: set members are unique, a set whose last
//! member is removed disappears, list appends keep arrival order, and a
//! set operation against a list key (or vice versa) is a type error.
//! One `RwLock` guards the map, making every primitive atomic.

use super::Store;
use crate::error::EngineError;
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Set(AHashSet<String>),
    List(Vec<String>),
}

#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<AHashMap<String, Entry>>,
}

fn wrong_type(key: &str) -> EngineError {
    EngineError::Storage(format!("key `{}` holds the wrong kind of value", key))
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            data: RwLock::new(AHashMap::new()),
        }
    }

    /// Number of live keys, across both entry types.
    pub fn key_count(&self) -> usize {
        self.data.read().len()
    }
}

impl Store for MemoryStore {
    fn set_add(&self, key: &str, member: &str) -> Result<bool, EngineError> {
        let mut data = self.data.write();
        match data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(AHashSet::new()))
        {
            Entry::Set(members) => {
                let inserted = members.insert(member.to_string());
                debug_assert!(
                    members.contains(member),
                    "member must be present after set_add"
                );
                Ok(inserted)
            }
            Entry::List(_) => Err(wrong_type(key)),
        }
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool, EngineError> {
        let mut data = self.data.write();
        let removed = match data.get_mut(key) {
            Some(Entry::Set(members)) => members.remove(member),
            Some(Entry::List(_)) => return Err(wrong_type(key)),
            None => false,
        };
        // Empty sets do not linger as keys.
        if let Some(Entry::Set(members)) = data.get(key) {
            if members.is_empty() {
                data.remove(key);
            }
        }
        Ok(removed)
    }

    fn set_len(&self, key: &str) -> Result<usize, EngineError> {
        match self.data.read().get(key) {
            Some(Entry::Set(members)) => Ok(members.len()),
            Some(Entry::List(_)) => Err(wrong_type(key)),
            None => Ok(0),
        }
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>, EngineError> {
        match self.data.read().get(key) {
            Some(Entry::Set(members)) => {
                let mut members: Vec<String> = members.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(Entry::List(_)) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    fn list_push(&self, key: &str, value: &str) -> Result<usize, EngineError> {
        let mut data = self.data.write();
        match data
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(Vec::new()))
        {
            Entry::List(values) => {
                values.push(value.to_string());
                Ok(values.len())
            }
            Entry::Set(_) => Err(wrong_type(key)),
        }
    }

    fn list_range(&self, key: &str) -> Result<Vec<String>, EngineError> {
        match self.data.read().get(key) {
            Some(Entry::List(values)) => Ok(values.clone()),
            Some(Entry::Set(_)) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    fn scan(&self, fragment: &str) -> Result<Vec<String>, EngineError> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .keys()
            .filter(|k| k.contains(fragment))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn delete(&self, key: &str) -> Result<bool, EngineError> {
        Ok(self.data.write().remove(key).is_some())
    }
}
