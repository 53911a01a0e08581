use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{watch, Mutex},
    task::{self, JoinHandle},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::store::KeyValueStore;

use super::{TickOutcome, TimerSession, TimerSnapshot};

const ENABLE_LOGS: bool = true;

const DEFAULT_HEARTBEAT_TICKS: u32 = 60;

struct Ticker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

struct ControllerState {
    session: TimerSession,
    ticker: Option<Ticker>,
    /// Bumped every time a ticker is installed or cancelled; ticks from an older generation
    /// are dropped.
    generation: u64,
}

impl ControllerState {
    fn cancel_ticker(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel_token.cancel();
            ticker.handle.abort();
        }
    }
}

/// Hosts a [`TimerSession`] on the tokio runtime.
///
/// All operations, including tick handling, take the same lock, so they never interleave.
/// Observers receive a fresh [`TimerSnapshot`] after every mutation through [`subscribe`].
///
/// [`subscribe`]: TimerController::subscribe
#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<ControllerState>>,
    snapshots: Arc<watch::Sender<TimerSnapshot>>,
    tick_interval: Duration,
    heartbeat_every_ticks: u32,
}

impl TimerController {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_tick_interval(store, Duration::from_secs(1))
    }

    pub fn with_tick_interval(store: Arc<dyn KeyValueStore>, tick_interval: Duration) -> Self {
        let session = TimerSession::new(store);
        let (snapshots, _) = watch::channel(session.snapshot());

        Self {
            state: Arc::new(Mutex::new(ControllerState {
                session,
                ticker: None,
                generation: 0,
            })),
            snapshots: Arc::new(snapshots),
            tick_interval,
            heartbeat_every_ticks: DEFAULT_HEARTBEAT_TICKS,
        }
    }

    /// Log a heartbeat every `ticks` ticks at debug level. Zero disables it.
    pub fn with_heartbeat_every(mut self, ticks: u32) -> Self {
        self.heartbeat_every_ticks = ticks;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        self.state.lock().await.session.snapshot()
    }

    pub async fn format_remaining(&self) -> String {
        self.state.lock().await.session.format_remaining()
    }

    pub async fn start(&self) -> TimerSnapshot {
        let mut guard = self.state.lock().await;
        if guard.session.start() {
            self.spawn_ticker(&mut guard);
            crate::log_info!(
                "Timer running: {} with {} left",
                guard.session.kind().label(),
                guard.session.format_remaining()
            );
        }
        self.publish(&guard)
    }

    pub async fn pause(&self) -> TimerSnapshot {
        let mut guard = self.state.lock().await;
        guard.cancel_ticker();
        if guard.session.pause() {
            crate::log_info!(
                "Timer paused with {} left",
                guard.session.format_remaining()
            );
        }
        self.publish(&guard)
    }

    pub async fn reset(&self) -> TimerSnapshot {
        let mut guard = self.state.lock().await;
        guard.cancel_ticker();
        guard.session.reset();
        crate::log_info!("Timer reset");
        self.publish(&guard)
    }

    fn publish(&self, state: &ControllerState) -> TimerSnapshot {
        let snapshot = state.session.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    /// Replaces any existing ticker with a new one bound to a fresh generation.
    fn spawn_ticker(&self, state: &mut ControllerState) {
        state.cancel_ticker();

        let generation = state.generation;
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(tick_loop(
            self.clone(),
            generation,
            cancel_token.clone(),
        ));

        state.ticker = Some(Ticker {
            handle,
            cancel_token,
        });
    }
}

async fn tick_loop(controller: TimerController, generation: u64, cancel_token: CancellationToken) {
    let period = controller.tick_interval;
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = interval.tick() => {}
        }

        // An expiring work interval writes stats through the store, which may block on disk,
        // so the tick runs on the blocking pool while holding the session lock there.
        let worker = controller.clone();
        let applied = task::spawn_blocking(move || {
            let mut guard = worker.state.blocking_lock();
            if guard.generation != generation {
                return None;
            }
            let outcome = guard.session.on_tick();
            if outcome != TickOutcome::Ignored {
                worker.publish(&guard);
            }
            Some((outcome, guard.session.kind()))
        })
        .await;

        let (outcome, kind) = match applied {
            Ok(Some(applied)) => applied,
            Ok(None) => break,
            Err(err) => {
                crate::log_error!("Tick handler failed: {}", err);
                break;
            }
        };

        match outcome {
            TickOutcome::Ignored => break,
            TickOutcome::Counted { remaining_seconds } => {
                ticks = ticks.wrapping_add(1);
                if controller.heartbeat_every_ticks > 0
                    && ticks % controller.heartbeat_every_ticks == 0
                {
                    crate::log_debug!("Heartbeat: {} {}s left", kind.as_str(), remaining_seconds);
                }
            }
            TickOutcome::Advanced { .. } => {
                ticks = 0;
            }
        }
    }
}
