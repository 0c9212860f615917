use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::KeyValueStore;
use super::error::{InvariantViolationSnafu, StorageResult};

/// In-process store, used by tests and by embeddings that do not need durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.into(), value.into());
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn entries(&self, stage: &'static str) -> StorageResult<MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| {
            InvariantViolationSnafu {
                stage,
                details: "memory store lock poisoned".to_string(),
            }
            .build()
        })
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries("memory-get")?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries("memory-set")?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries("memory-remove")?.remove(key);
        Ok(())
    }
}
