//! Logging macros gated by a per-module `ENABLE_LOGS` flag.
//!
//! A module opts in by declaring the flag and calling the macros through the crate root:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! crate::log_info!("Timer running: {}", label);
//! ```
//! Flipping the flag to `false` silences a noisy module without touching `RUST_LOG`.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Maps the debug toggle onto the default level passed to `env_logger`.
pub fn default_level(debug: bool) -> log::LevelFilter {
    if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    }
}

/// Initializes `env_logger`. `RUST_LOG` still takes precedence per module.
pub fn init(debug: bool) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level(debug))
        .parse_default_env()
        .try_init();
}
