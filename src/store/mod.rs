//! Key-value persistence for lifetime statistics.
//!
//! The timer only needs `get`/`set` over a handful of keys, so every backend is hidden behind
//! [`KeyValueStore`] and injected into the session as `Arc<dyn KeyValueStore>`.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::config::{AppConfig, StoreBackend};

mod json;
mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

const ENABLE_LOGS: bool = true;

pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Writes several keys together. Backends that can commit them as one unit override this;
    /// the default falls back to one `set` per entry.
    fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value.clone())?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.insert(key.to_string(), value);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        for (key, value) in entries {
            guard.insert(key.to_string(), value.clone());
        }
        Ok(())
    }
}

/// Opens the backend selected by `config`, creating the data directory if needed.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn KeyValueStore>> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    let path = config.store_path();
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(path.clone())?),
        StoreBackend::Sqlite => Arc::new(SqliteStore::new(path.clone())?),
    };

    crate::log_info!(
        "Opened {} stats store at {}",
        config.backend.as_str(),
        path.display()
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn memory_store_returns_none_for_missing_key() {
        let store = MemoryStore::new();
        assert!(store.get("completedSessions").unwrap().is_none());
    }

    #[test]
    fn memory_store_overwrites_values() {
        let store = MemoryStore::new();
        store.set("completedSessions", json!(1)).unwrap();
        store.set("completedSessions", json!(2)).unwrap();
        assert_eq!(store.get("completedSessions").unwrap(), Some(json!(2)));
    }

    #[test]
    fn memory_store_writes_batches() {
        let store = MemoryStore::new();
        store
            .set_many(&[("completedSessions", json!(4)), ("totalTimeSpent", json!(6000.0))])
            .unwrap();
        assert_eq!(store.get("completedSessions").unwrap(), Some(json!(4)));
        assert_eq!(store.get("totalTimeSpent").unwrap(), Some(json!(6000.0)));
    }

    #[test]
    fn open_store_creates_data_dir_for_each_backend() {
        let temp_dir = TempDir::new().unwrap();

        for backend in [StoreBackend::Json, StoreBackend::Sqlite] {
            let config = AppConfig {
                data_dir: temp_dir.path().join("nested").join(backend.as_str()),
                backend,
                tick_interval: Duration::from_secs(1),
                debug: false,
            };

            let store = open_store(&config).unwrap();
            store.set("totalTimeSpent", json!(1500.0)).unwrap();

            assert!(config.data_dir.is_dir());
            assert_eq!(store.get("totalTimeSpent").unwrap(), Some(json!(1500.0)));
        }
    }
}
