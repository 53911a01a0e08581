use serde::{Deserialize, Serialize};

pub const WORK_SECS: u64 = 25 * 60;
pub const SHORT_BREAK_SECS: u64 = 5 * 60;
pub const LONG_BREAK_SECS: u64 = 15 * 60;

/// Every Nth completed work interval earns a long break.
pub const LONG_BREAK_EVERY: u64 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum IntervalKind {
    Work,
    ShortBreak,
    LongBreak,
}

impl Default for IntervalKind {
    fn default() -> Self {
        IntervalKind::Work
    }
}

impl IntervalKind {
    pub fn duration_secs(self) -> u64 {
        duration_of(self)
    }

    pub fn is_break(self) -> bool {
        !matches!(self, IntervalKind::Work)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntervalKind::Work => "work",
            IntervalKind::ShortBreak => "short_break",
            IntervalKind::LongBreak => "long_break",
        }
    }

    /// Human-facing name used by the console renderer.
    pub fn label(self) -> &'static str {
        match self {
            IntervalKind::Work => "Work",
            IntervalKind::ShortBreak => "Short Break",
            IntervalKind::LongBreak => "Long Break",
        }
    }
}

pub fn duration_of(kind: IntervalKind) -> u64 {
    match kind {
        IntervalKind::Work => WORK_SECS,
        IntervalKind::ShortBreak => SHORT_BREAK_SECS,
        IntervalKind::LongBreak => LONG_BREAK_SECS,
    }
}

/// Picks the break that follows a work interval.
///
/// `work_sessions_completed` is the count *including* the interval that just ended, so the
/// 4th, 8th, 12th... work interval is followed by a long break.
pub fn next_break_kind(work_sessions_completed: u64) -> IntervalKind {
    if work_sessions_completed % LONG_BREAK_EVERY == 0 {
        IntervalKind::LongBreak
    } else {
        IntervalKind::ShortBreak
    }
}
