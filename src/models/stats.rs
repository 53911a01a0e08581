use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::store::KeyValueStore;

const ENABLE_LOGS: bool = true;

pub const COMPLETED_SESSIONS_KEY: &str = "completedSessions";
pub const TOTAL_TIME_SPENT_KEY: &str = "totalTimeSpent";

/// Lifetime counters. Only completed work intervals contribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub completed_sessions: u64,
    pub total_time_spent_seconds: f64,
}

impl Stats {
    /// Reads both counters from `store`. Missing, unreadable or malformed values fall back to
    /// zero independently of each other.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let completed_sessions =
            read_or_default(store, COMPLETED_SESSIONS_KEY, 0, |value| value.as_u64());
        let total_time_spent_seconds = read_or_default(store, TOTAL_TIME_SPENT_KEY, 0.0, |value| {
            value.as_f64().filter(|secs| secs.is_finite() && *secs >= 0.0)
        });

        Self {
            completed_sessions,
            total_time_spent_seconds,
        }
    }

    /// Writes both counters in one batch so they never disagree on disk.
    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set_many(&[
            (COMPLETED_SESSIONS_KEY, json!(self.completed_sessions)),
            (TOTAL_TIME_SPENT_KEY, json!(self.total_time_spent_seconds)),
        ])
    }

    pub fn record_work_interval(&mut self, duration_secs: u64) {
        self.completed_sessions += 1;
        self.total_time_spent_seconds += duration_secs as f64;
    }

    pub fn total_minutes(&self) -> u64 {
        (self.total_time_spent_seconds / 60.0) as u64
    }
}

fn read_or_default<T, F>(store: &dyn KeyValueStore, key: &str, default: T, decode: F) -> T
where
    T: Copy,
    F: FnOnce(&Value) -> Option<T>,
{
    match store.get(key) {
        Ok(Some(value)) => decode(&value).unwrap_or_else(|| {
            crate::log_warn!("Stored value for '{}' is malformed ({}); using default", key, value);
            default
        }),
        Ok(None) => default,
        Err(err) => {
            crate::log_warn!("Failed to read '{}' from stats store: {:#}; using default", key, err);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<Value>> {
            Err(anyhow!("disk on fire"))
        }

        fn set(&self, _key: &str, _value: Value) -> Result<()> {
            Err(anyhow!("disk on fire"))
        }
    }

    #[test]
    fn empty_store_loads_defaults() {
        let store = MemoryStore::new();
        assert_eq!(Stats::load(&store), Stats::default());
    }

    #[test]
    fn failed_reads_load_defaults() {
        assert_eq!(Stats::load(&BrokenStore), Stats::default());
    }

    #[test]
    fn malformed_values_fall_back_per_key() {
        let store = MemoryStore::new();
        store.set(COMPLETED_SESSIONS_KEY, json!("seven")).unwrap();
        store.set(TOTAL_TIME_SPENT_KEY, json!(3000.0)).unwrap();

        let stats = Stats::load(&store);
        assert_eq!(stats.completed_sessions, 0);
        assert_eq!(stats.total_time_spent_seconds, 3000.0);

        store.set(COMPLETED_SESSIONS_KEY, json!(2)).unwrap();
        store.set(TOTAL_TIME_SPENT_KEY, json!(-5.0)).unwrap();

        let stats = Stats::load(&store);
        assert_eq!(stats.completed_sessions, 2);
        assert_eq!(stats.total_time_spent_seconds, 0.0);
    }

    #[test]
    fn integer_total_time_is_accepted() {
        let store = MemoryStore::new();
        store.set(TOTAL_TIME_SPENT_KEY, json!(1500)).unwrap();
        assert_eq!(Stats::load(&store).total_time_spent_seconds, 1500.0);
    }

    #[test]
    fn persist_writes_both_keys() {
        let store = MemoryStore::new();
        let mut stats = Stats::default();
        stats.record_work_interval(1500);
        stats.record_work_interval(1500);
        stats.persist(&store).unwrap();

        assert_eq!(store.get(COMPLETED_SESSIONS_KEY).unwrap(), Some(json!(2)));
        assert_eq!(store.get(TOTAL_TIME_SPENT_KEY).unwrap(), Some(json!(3000.0)));
        assert_eq!(Stats::load(&store), stats);
        assert_eq!(stats.total_minutes(), 50);
    }

    #[derive(Default)]
    struct BatchRecordingStore {
        single_writes: Mutex<usize>,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl KeyValueStore for BatchRecordingStore {
        fn get(&self, _key: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: Value) -> Result<()> {
            *self.single_writes.lock().unwrap() += 1;
            Ok(())
        }

        fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
            let keys = entries.iter().map(|(key, _)| key.to_string()).collect();
            self.batches.lock().unwrap().push(keys);
            Ok(())
        }
    }

    #[test]
    fn persist_writes_counters_as_one_batch() {
        let store = BatchRecordingStore::default();
        let mut stats = Stats::default();
        stats.record_work_interval(1500);
        stats.persist(&store).unwrap();

        assert_eq!(*store.single_writes.lock().unwrap(), 0);
        assert_eq!(
            *store.batches.lock().unwrap(),
            vec![vec![
                COMPLETED_SESSIONS_KEY.to_string(),
                TOTAL_TIME_SPENT_KEY.to_string()
            ]]
        );
    }

    #[test]
    fn persist_reports_store_failure() {
        assert!(Stats::default().persist(&BrokenStore).is_err());
    }
}
