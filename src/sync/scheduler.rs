// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{SyncCoordinator, SyncOutcome};

/// Work run on every scheduler tick.
#[async_trait]
pub trait SyncTask: Send + Sync + 'static {
    async fn tick(&self);
}

#[async_trait]
impl SyncTask for SyncCoordinator {
    async fn tick(&self) {
        match self.run_full_sync(false).await {
            SyncOutcome::Ran(report) if report.has_errors() => {
                log::warn!("scheduled sync completed with errors")
            }
            SyncOutcome::Ran(_) => log::debug!("scheduled sync completed"),
            SyncOutcome::Skipped { reason } => {
                log::debug!("scheduled sync skipped: {:?}", reason)
            }
        }
    }
}

struct Running {
    handle: JoinHandle<()>,
    stop: Arc<Notify>,
}

/// Foreground periodic sync. The first tick fires one interval after
/// `start`. Stopping never interrupts a tick already running; that tick
/// finishes and no further tick starts.
pub struct SyncScheduler {
    task: Arc<dyn SyncTask>,
    running: Mutex<Option<Running>>,
    generation: Arc<AtomicU64>,
}

impl SyncScheduler {
    pub fn new(task: Arc<dyn SyncTask>) -> Self {
        Self {
            task,
            running: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns `false` when a timer is already running.
    pub fn start(&self, every: Duration) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }
        let every = every.max(Duration::from_millis(1));
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let task = Arc::clone(&self.task);
        let stop = Arc::new(Notify::new());
        let stopped = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stopped.notified() => break,
                    _ = ticker.tick() => {}
                }
                if current.load(Ordering::SeqCst) != generation {
                    break;
                }
                task.tick().await;
            }
        });
        *running = Some(Running { handle, stop });
        log::info!("sync scheduler started (every {:?})", every);
        true
    }

    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let taken = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(r) = taken {
            // Stored as a permit when the loop is mid-tick; the handle is
            // detached so that tick runs to completion.
            r.stop.notify_one();
            log::info!("sync scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
