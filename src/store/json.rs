use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};
use tempfile::NamedTempFile;

use super::KeyValueStore;

const ENABLE_LOGS: bool = true;

/// Keeps every key in one JSON object and rewrites the file on each write.
///
/// Writes go to a temp file in the same directory and are renamed over the old file, so a
/// crash mid-write leaves the previous contents intact.
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read stats from {}", path.display()))?;
            match serde_json::from_str::<Map<String, Value>>(&contents) {
                Ok(map) => map,
                Err(err) => {
                    crate::log_warn!(
                        "Ignoring malformed stats file {}: {}",
                        path.display(),
                        err
                    );
                    Map::new()
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let serialized = serde_json::to_string_pretty(data)?;
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to stage stats in {}", dir.display()))?;
        staged.write_all(serialized.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .with_context(|| format!("Failed to write stats to {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow!("stats file lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("stats file lock poisoned"))?;
        guard.insert(key.to_string(), value);
        self.persist(&guard)
    }

    fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("stats file lock poisoned"))?;
        for (key, value) in entries {
            guard.insert(key.to_string(), value.clone());
        }
        self.persist(&guard)
    }
}
