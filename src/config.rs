use anyhow::{bail, Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

pub const DATA_DIR_ENV: &str = "POMODORO_DATA_DIR";
pub const STORE_ENV: &str = "POMODORO_STORE";
pub const TICK_MS_ENV: &str = "POMODORO_TICK_MS";
pub const DEBUG_ENV: &str = "POMODORO_DEBUG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Sqlite,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Json
    }
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Json => "json",
            StoreBackend::Sqlite => "sqlite",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            StoreBackend::Json => "stats.json",
            StoreBackend::Sqlite => "stats.sqlite3",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "json" => Ok(StoreBackend::Json),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub backend: StoreBackend,
    pub tick_interval: Duration,
    /// Debug logging plus a heartbeat log on every tick.
    pub debug: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(DATA_DIR_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let backend = match lookup(STORE_ENV) {
            Some(raw) => match raw.parse::<StoreBackend>() {
                Ok(backend) => backend,
                Err(_) => bail!("{STORE_ENV} must be 'json' or 'sqlite', got '{raw}'"),
            },
            None => StoreBackend::default(),
        };

        let tick_interval = match lookup(TICK_MS_ENV) {
            Some(raw) => {
                let millis: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{TICK_MS_ENV} must be a whole number, got '{raw}'"))?;
                if millis == 0 {
                    bail!("{TICK_MS_ENV} must be greater than zero");
                }
                Duration::from_millis(millis)
            }
            None => Duration::from_secs(1),
        };

        let debug = lookup(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            data_dir,
            backend,
            tick_interval,
            debug,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(self.backend.file_name())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("pomodoro"))
        .unwrap_or_else(|| PathBuf::from(".pomodoro"))
}
