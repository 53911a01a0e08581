use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{models::Stats, store::KeyValueStore};

use super::policy::{duration_of, next_break_kind, IntervalKind};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Running,
    Paused,
    Stopped,
}

impl Default for RunStatus {
    fn default() -> Self {
        RunStatus::Stopped
    }
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Stopped => "stopped",
        }
    }
}

/// What a single tick did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session was not running; nothing changed.
    Ignored,
    Counted { remaining_seconds: u64 },
    /// The interval expired and the next one has already started.
    Advanced {
        finished: IntervalKind,
        next: IntervalKind,
    },
}

/// Everything a presentation layer needs to draw the timer.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub kind: IntervalKind,
    pub status: RunStatus,
    pub remaining_seconds: u64,
    pub remaining_display: String,
    pub progress: f64,
    pub work_sessions_completed: u64,
    pub stats: Stats,
}

/// The Pomodoro state machine.
///
/// Knows nothing about wall-clock time: the host calls [`TimerSession::on_tick`] once per
/// elapsed second while the session is running and owns the tick subscription itself.
pub struct TimerSession {
    kind: IntervalKind,
    status: RunStatus,
    remaining_seconds: u64,
    /// Work intervals finished during this process; decides short vs long breaks.
    work_sessions_completed: u64,
    stats: Stats,
    store: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for TimerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSession")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("remaining_seconds", &self.remaining_seconds)
            .field("work_sessions_completed", &self.work_sessions_completed)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl TimerSession {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let stats = Stats::load(store.as_ref());
        crate::log_info!(
            "Loaded stats: {} completed sessions, {:.0}s focused",
            stats.completed_sessions,
            stats.total_time_spent_seconds
        );

        Self {
            kind: IntervalKind::Work,
            status: RunStatus::Stopped,
            remaining_seconds: duration_of(IntervalKind::Work),
            work_sessions_completed: 0,
            stats,
            store,
        }
    }

    pub fn kind(&self) -> IntervalKind {
        self.kind
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn work_sessions_completed(&self) -> u64 {
        self.work_sessions_completed
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Returns `true` when the session moved into `Running`, i.e. the caller must install a
    /// fresh tick subscription. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        match self.status {
            RunStatus::Running => false,
            RunStatus::Stopped => {
                self.remaining_seconds = duration_of(self.kind);
                self.status = RunStatus::Running;
                true
            }
            RunStatus::Paused => {
                self.status = RunStatus::Running;
                true
            }
        }
    }

    /// Returns `true` if a running session was paused.
    pub fn pause(&mut self) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.status = RunStatus::Paused;
        true
    }

    pub fn reset(&mut self) {
        self.status = RunStatus::Stopped;
        self.kind = IntervalKind::Work;
        self.remaining_seconds = duration_of(IntervalKind::Work);
    }

    pub fn on_tick(&mut self) -> TickOutcome {
        if self.status != RunStatus::Running {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds > 0 {
            return TickOutcome::Counted {
                remaining_seconds: self.remaining_seconds,
            };
        }

        self.expire()
    }

    fn expire(&mut self) -> TickOutcome {
        let finished = self.kind;

        self.kind = match finished {
            IntervalKind::Work => {
                self.stats.record_work_interval(duration_of(IntervalKind::Work));
                if let Err(err) = self.stats.persist(self.store.as_ref()) {
                    crate::log_error!("Failed to persist stats: {:#}", err);
                }
                self.work_sessions_completed += 1;
                next_break_kind(self.work_sessions_completed)
            }
            IntervalKind::ShortBreak | IntervalKind::LongBreak => IntervalKind::Work,
        };
        self.remaining_seconds = duration_of(self.kind);

        crate::log_info!(
            "{} finished; starting {} ({} work sessions this run)",
            finished.label(),
            self.kind.label(),
            self.work_sessions_completed
        );

        TickOutcome::Advanced {
            finished,
            next: self.kind,
        }
    }

    pub fn format_remaining(&self) -> String {
        format_clock(self.remaining_seconds)
    }

    /// 0.0 .. 1.0 progress within the current interval.
    pub fn progress(&self) -> f64 {
        let total = duration_of(self.kind);
        if total == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_seconds.min(total) as f64 / total as f64)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            kind: self.kind,
            status: self.status,
            remaining_seconds: self.remaining_seconds,
            remaining_display: self.format_remaining(),
            progress: self.progress(),
            work_sessions_completed: self.work_sessions_completed,
            stats: self.stats,
        }
    }
}

/// Renders whole seconds as zero-padded `MM:SS`.
pub fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
