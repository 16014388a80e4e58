//! Cancellable scheduled tasks
//!
//! Every delayed or periodic action in the node (queue retries, the
//! stability tick, the self-rescheduling run loop, delayed process exit)
//! goes through this scheduler. Each task races its timer against the
//! shutdown broadcast, so no timer can fire against a torn-down node.

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a scheduled task
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Cancel the task without waiting for its timer
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to run to completion or be cancelled
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Spawns timers that all die together on shutdown
#[derive(Clone)]
pub struct Scheduler {
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    /// Run `task` once after `delay`, unless shutdown fires first.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => task.await,
                _ = shutdown_rx.recv() => {}
            }
        });
        TaskHandle { handle }
    }

    /// Run `tick` every `period` until shutdown. The first tick fires one
    /// full period after the call; missed ticks are skipped, not bunched.
    pub fn every<F, Fut>(&self, period: Duration, mut tick: F) -> TaskHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // An interval's first tick completes immediately; consume it so
            // the first real tick lands a full period out.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => tick().await,
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        TaskHandle { handle }
    }
}
