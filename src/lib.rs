//! Pomodoro countdown engine.
//!
//! [`timer::TimerSession`] is the work/break state machine, [`timer::TimerController`] hosts it
//! on tokio with a single one-second ticker, and [`store`] persists lifetime statistics.

pub mod config;
pub mod console;
pub mod models;
pub mod store;
pub mod timer;
pub mod utils;

pub use config::{AppConfig, StoreBackend};
pub use models::Stats;
pub use store::{open_store, JsonFileStore, KeyValueStore, MemoryStore, SqliteStore};
pub use timer::{
    IntervalKind, RunStatus, TickOutcome, TimerController, TimerSession, TimerSnapshot,
};

use anyhow::{Context, Result};

/// Entry point for the `pomodoro` binary.
pub fn run() -> Result<()> {
    let config = AppConfig::from_env()?;
    utils::logging::init(config.debug);

    log::info!("Pomodoro starting up...");

    let store = open_store(&config)?;
    let controller = TimerController::with_tick_interval(store, config.tick_interval)
        .with_heartbeat_every(if config.debug { 1 } else { 60 });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(console::run_console(controller))?;

    log::info!("Pomodoro shutting down");
    Ok(())
}
