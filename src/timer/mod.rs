pub mod controller;
pub mod policy;
pub mod session;

pub use controller::TimerController;
pub use policy::{duration_of, next_break_kind, IntervalKind};
pub use session::{format_clock, RunStatus, TickOutcome, TimerSession, TimerSnapshot};
