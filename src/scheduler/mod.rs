//! Scheduler module for driving probes on a fixed interval.

mod retention;

pub use retention::*;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Work performed once per scheduler tick.
pub trait Tick: Send + Sync + 'static {
    fn tick(&self) -> impl Future<Output = ()> + Send;
}

/// Lifecycle of a scheduler. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,
    #[error("scheduler was stopped and cannot be restarted")]
    Stopped,
    #[error("tick interval must be non-zero")]
    InvalidInterval,
}

/// Runs a [`Tick`] on a fixed interval in a background task.
pub struct Scheduler<T: Tick> {
    task: Arc<T>,
    state: Mutex<SchedulerState>,
    stop_tx: broadcast::Sender<()>,
    in_flight: Arc<AtomicUsize>,
}

impl<T: Tick> Scheduler<T> {
    pub fn new(task: Arc<T>) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            task,
            state: Mutex::new(SchedulerState::Idle),
            stop_tx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start ticking every `interval`. The first tick fires immediately.
    pub fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            SchedulerState::Running => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            SchedulerState::Idle => {}
        }
        *state = SchedulerState::Running;

        let stop_rx = self.stop_tx.subscribe();
        let task = self.task.clone();
        let in_flight = self.in_flight.clone();

        tracing::info!("Scheduler: ticking every {:?}", interval);
        tokio::spawn(run_tick_loop(task, interval, in_flight, stop_rx));

        Ok(())
    }

    /// Halt future ticks. A tick already in progress runs to completion.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SchedulerState::Stopped {
            return;
        }
        *state = SchedulerState::Stopped;
        // No receivers means the loop was never started.
        let _ = self.stop_tx.send(());
        tracing::info!("Scheduler: stop requested");
    }

    /// Number of ticks currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

async fn run_tick_loop<T: Tick>(
    task: Arc<T>,
    period: Duration,
    in_flight: Arc<AtomicUsize>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.recv() => {
                break;
            }
            _ = interval.tick() => {
                let running = in_flight.fetch_add(1, Ordering::SeqCst);
                if running > 0 {
                    tracing::warn!("Scheduler: tick fired with {} tick(s) still in flight", running);
                }

                // Spawned so that stopping the loop never aborts a tick.
                let task = task.clone();
                let in_flight = in_flight.clone();
                tokio::spawn(async move {
                    task.tick().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }
    }

    tracing::info!("Scheduler: stopped");
}
