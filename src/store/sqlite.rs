use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::KeyValueStore;

const ENABLE_LOGS: bool = true;

const SCHEMA_VERSION: i32 = 1;

const UPSERT_SQL: &str = "INSERT INTO kv (key, value, updated_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET
         value = excluded.value,
         updated_at = excluded.updated_at";

enum KvRequest {
    Get {
        key: String,
        reply: mpsc::Sender<Result<Option<Value>>>,
    },
    /// Values arrive already encoded; every entry lands in one transaction.
    Put {
        entries: Vec<(String, String)>,
        reply: mpsc::Sender<Result<()>>,
    },
}

/// SQLite-backed store with one `kv` table.
///
/// The connection is owned by a worker thread that answers get/put requests in order, so the
/// store is `Send + Sync` without sharing the connection. Dropping the store closes the request
/// channel and joins the worker.
pub struct SqliteStore {
    path: PathBuf,
    requests: Mutex<Option<mpsc::Sender<KvRequest>>>,
    worker: Option<JoinHandle<()>>,
}

impl SqliteStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open stats database {}", path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            crate::log_warn!("Failed to enable WAL mode on stats database: {}", err);
        }
        ensure_schema(&conn)?;

        let (requests_tx, requests_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("pomodoro-stats-db".into())
            .spawn(move || serve(conn, requests_rx))
            .context("failed to spawn stats database thread")?;

        crate::log_info!("Stats database ready at {}", path.display());

        Ok(Self {
            path,
            requests: Mutex::new(Some(requests_tx)),
            worker: Some(worker),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn request<T>(&self, build: impl FnOnce(mpsc::Sender<Result<T>>) -> KvRequest) -> Result<T> {
        let (reply_tx, reply_rx) = mpsc::channel();
        {
            let guard = self
                .requests
                .lock()
                .map_err(|_| anyhow!("stats database sender lock poisoned"))?;
            let sender = guard
                .as_ref()
                .ok_or_else(|| anyhow!("stats database is closed"))?;
            sender
                .send(build(reply_tx))
                .map_err(|_| anyhow!("stats database thread has stopped"))?;
        }
        reply_rx
            .recv()
            .map_err(|_| anyhow!("stats database thread dropped the request"))?
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.request(|reply| KvRequest::Get { key, reply })
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        let entries = entries
            .iter()
            .map(|(key, value)| -> Result<(String, String)> {
                Ok((key.to_string(), serde_json::to_string(value)?))
            })
            .collect::<Result<Vec<_>>>()?;
        self.request(|reply| KvRequest::Put { entries, reply })
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        // Closing the channel ends the worker's receive loop.
        drop(
            self.requests
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                crate::log_error!("Stats database thread panicked");
            }
        }
    }
}

/// Creates the `kv` table on a fresh database. A database written by a newer schema is refused
/// rather than guessed at.
fn ensure_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read stats database version")?;

    match version {
        0 => {
            conn.execute_batch(include_str!("schemas/kv.sql"))
                .context("failed to create kv table")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("failed to record stats database version")?;
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        other => bail!(
            "stats database version {} is not supported (expected {})",
            other,
            SCHEMA_VERSION
        ),
    }
}

fn serve(mut conn: Connection, requests: mpsc::Receiver<KvRequest>) {
    while let Ok(request) = requests.recv() {
        let delivered = match request {
            KvRequest::Get { key, reply } => reply.send(read_value(&conn, &key)).is_ok(),
            KvRequest::Put { entries, reply } => {
                reply.send(write_values(&mut conn, &entries)).is_ok()
            }
        };
        if !delivered {
            crate::log_warn!("Stats database caller went away before the reply");
        }
    }

    crate::log_info!("Stats database thread shutting down");
}

fn read_value(conn: &Connection, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .with_context(|| format!("failed to read key '{key}'"))?;

    raw.map(|text| {
        serde_json::from_str(&text)
            .with_context(|| format!("stored value for '{key}' is not valid JSON"))
    })
    .transpose()
}

fn write_values(conn: &mut Connection, entries: &[(String, String)]) -> Result<()> {
    let updated_at = Utc::now().to_rfc3339();
    let tx = conn
        .transaction()
        .context("failed to begin stats write")?;
    {
        let mut upsert = tx.prepare_cached(UPSERT_SQL)?;
        for (key, value) in entries {
            upsert
                .execute(params![key, value, updated_at])
                .with_context(|| format!("failed to write key '{key}'"))?;
        }
    }
    tx.commit().context("failed to commit stats write")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn user_version(conn: &Connection) -> i32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn set_then_get_and_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("stats.sqlite3")).unwrap();

        assert!(store.get("completedSessions").unwrap().is_none());

        store.set("completedSessions", json!(1)).unwrap();
        store.set("completedSessions", json!(2)).unwrap();
        assert_eq!(store.get("completedSessions").unwrap(), Some(json!(2)));
    }

    #[test]
    fn values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.sqlite3");

        {
            let store = SqliteStore::new(path.clone()).unwrap();
            store.set("totalTimeSpent", json!(3000.0)).unwrap();
        }

        let reopened = SqliteStore::new(path).unwrap();
        assert_eq!(reopened.get("totalTimeSpent").unwrap(), Some(json!(3000.0)));
    }

    #[test]
    fn batch_shares_one_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.sqlite3");
        let store = SqliteStore::new(path.clone()).unwrap();

        store
            .set_many(&[("completedSessions", json!(5)), ("totalTimeSpent", json!(7500.0))])
            .unwrap();
        assert_eq!(store.get("completedSessions").unwrap(), Some(json!(5)));
        assert_eq!(store.get("totalTimeSpent").unwrap(), Some(json!(7500.0)));

        let conn = Connection::open(&path).unwrap();
        let stamps: i64 = conn
            .query_row("SELECT COUNT(DISTINCT updated_at) FROM kv", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stamps, 1);
    }

    #[test]
    fn corrupt_value_surfaces_as_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.sqlite3");
        let store = SqliteStore::new(path.clone()).unwrap();

        Connection::open(&path)
            .unwrap()
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES ('completedSessions', 'oops', '')",
                [],
            )
            .unwrap();

        assert!(store.get("completedSessions").is_err());
    }

    #[test]
    fn fresh_database_gets_kv_table() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(user_version(&conn), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'kv'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);

        ensure_schema(&conn).unwrap();
        assert_eq!(user_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stats.sqlite3");
        Connection::open(&path)
            .unwrap()
            .pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        assert!(SqliteStore::new(path).is_err());
    }
}
