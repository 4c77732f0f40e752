//! Unit-interval progress handles and the sampling loop that publishes them.
//!
//! Producers (the cache copy loop, the extraction encode stage) only write
//! atomics or a `watch` value. A separate sampler task reads those on a fixed
//! interval and publishes events, so a slow event consumer can never stall
//! the work being measured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Clamp into `[0, 1]`, mapping NaN to zero.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Monotonic progress of the current operation on an item or stream.
///
/// Values only move forward until [`Progress::reset`] starts a new operation.
#[derive(Debug, Clone)]
pub struct Progress {
    tx: Arc<watch::Sender<f64>>,
}

impl Progress {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0.0);
        Self { tx: Arc::new(tx) }
    }

    pub fn value(&self) -> f64 {
        *self.tx.borrow()
    }

    /// Observe every change. The receiver sees the latest value, not every
    /// intermediate one.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.tx.subscribe()
    }

    pub(crate) fn reset(&self) {
        self.tx.send_replace(0.0);
    }

    /// Raise progress to `value` (clamped). Lower values are ignored.
    pub(crate) fn advance(&self, value: f64) -> bool {
        let value = clamp_unit(value);
        self.tx.send_if_modified(|current| {
            if value > *current {
                *current = value;
                true
            } else {
                false
            }
        })
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// One reading taken by the sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Sample {
    Value(f64),
    /// The total is unknown; sampling stops for good.
    Unknown,
}

/// Spawn a loop that calls `sample` every `interval` and passes changed
/// values to `emit` until `stop` fires. One last reading is taken after stop
/// so completion is observed.
pub(crate) fn spawn_sampler<S, E>(
    interval: Duration,
    stop: CancellationToken,
    mut sample: S,
    mut emit: E,
) -> JoinHandle<()>
where
    S: FnMut() -> Sample + Send + 'static,
    E: FnMut(f64) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<f64> = None;

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match sample() {
                Sample::Unknown => {
                    debug!("Total length unknown, progress sampling disabled");
                    return;
                }
                Sample::Value(value) => {
                    if last != Some(value) {
                        last = Some(value);
                        emit(value);
                    }
                }
            }
        }

        if let Sample::Value(value) = sample() {
            if last != Some(value) {
                emit(value);
            }
        }
    })
}
