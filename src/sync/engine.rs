// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::{CancelToken, SkipReason, SyncOutcome, SyncReport};
use crate::config::Config;
use crate::gateway::RemoteGateway;
use crate::session::SessionProvider;
use crate::store::LocalStore;
use crate::utils::now_millis;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Minimum spacing between unforced cycles.
    pub min_interval: Duration,
    /// A lock older than this is assumed abandoned and taken over.
    pub stale_lock_after: Duration,
    pub pull_page_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(120),
            stale_lock_after: Duration::from_secs(45),
            pull_page_size: 500,
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: config.sync_throttle(),
            ..Self::default()
        }
    }
}

/// Owns one sync context: its lock, its throttle clock and its
/// cancellation token.
pub struct SyncCoordinator {
    pub(super) store: Arc<dyn LocalStore>,
    pub(super) gateway: Arc<RemoteGateway>,
    sessions: Arc<dyn SessionProvider>,
    pub(super) settings: SyncSettings,
    lock: Mutex<Option<Instant>>,
    last_run: Mutex<Option<Instant>>,
    pub(super) cancel: CancelToken,
}

/// Releases the coordinator lock on drop, unless a stale takeover already
/// handed it to a newer cycle.
struct RunGuard<'a> {
    lock: &'a Mutex<Option<Instant>>,
    acquired: Instant,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if *held == Some(self.acquired) {
            *held = None;
        }
    }
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn LocalStore>,
        gateway: Arc<RemoteGateway>,
        sessions: Arc<dyn SessionProvider>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            gateway,
            sessions,
            settings,
            lock: Mutex::new(None),
            last_run: Mutex::new(None),
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        guard(&self.lock).is_some()
    }

    fn try_lock(&self) -> Option<RunGuard<'_>> {
        let mut held = guard(&self.lock);
        let now = Instant::now();
        if let Some(since) = *held {
            if now.duration_since(since) < self.settings.stale_lock_after {
                return None;
            }
            log::warn!(
                "sync lock held for {:?}; releasing stale lock",
                now.duration_since(since)
            );
        }
        *held = Some(now);
        Some(RunGuard {
            lock: &self.lock,
            acquired: now,
        })
    }

    /// One full push-then-pull cycle. Never fails: transport problems end up
    /// in the report and preconditions end up as a skip reason.
    pub async fn run_full_sync(&self, force: bool) -> SyncOutcome {
        if self.cancel.is_cancelled() {
            return SyncOutcome::skipped(SkipReason::Cancelled);
        }

        let user_id = match self.sessions.get_session().await {
            Some(s) if s.is_remote_compatible() => s.id,
            Some(_) => {
                log::debug!("local-only session, not syncing");
                return SyncOutcome::skipped(SkipReason::NoSession);
            }
            None => return SyncOutcome::skipped(SkipReason::NoSession),
        };

        let Some(_run) = self.try_lock() else {
            log::debug!("sync already running");
            return SyncOutcome::skipped(SkipReason::AlreadyRunning);
        };

        {
            let mut last = guard(&self.last_run);
            let now = Instant::now();
            if !force {
                if let Some(prev) = *last {
                    if now.duration_since(prev) < self.settings.min_interval {
                        log::debug!("sync throttled");
                        return SyncOutcome::skipped(SkipReason::Throttled);
                    }
                }
            }
            *last = Some(now);
        }

        log::info!("sync cycle starting (force={})", force);
        let state = match self.store.sync_state(&user_id).await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("could not read sync state, starting from scratch: {:#}", e);
                Default::default()
            }
        };

        if self.cancel.is_cancelled() {
            return SyncOutcome::skipped(SkipReason::Cancelled);
        }
        let push = self.push_phase(&user_id, &state).await;

        if self.cancel.is_cancelled() {
            log::info!("sync cancelled after push");
            return SyncOutcome::skipped(SkipReason::Cancelled);
        }
        let pull = self.pull_phase(&user_id, &state).await;

        if pull.cancelled {
            return SyncOutcome::skipped(SkipReason::Cancelled);
        }

        if let Err(e) = self.store.mark_sync_completed(&user_id, now_millis()).await {
            log::warn!("could not record sync time: {:#}", e);
        }

        let report = SyncReport { push, pull };
        if report.has_errors() {
            log::warn!(
                "sync cycle finished with errors: pushed {}/{}, pulled {} ({} failed)",
                report.push.pushed,
                report.push.attempted,
                report.pull.fetched,
                report.pull.failed
            );
        } else {
            log::info!(
                "sync cycle finished: pushed {}, pulled {}",
                report.push.pushed,
                report.pull.fetched
            );
        }
        SyncOutcome::Ran(report)
    }
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
