// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Two-way reconciliation between the local store and the remote store.
//!
//! A cycle pushes pending local rows first, then pulls remote changes since
//! the persisted cursor. Conflicts resolve last-write-wins with one
//! asymmetry: a row the user has pending locally is never overwritten by a
//! pull.

mod engine;
mod pull;
mod push;
mod scheduler;

pub use engine::{SyncCoordinator, SyncSettings};
pub use pull::PullReport;
pub use push::{push_order, PushReport};
pub use scheduler::{SyncScheduler, SyncTask};

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked at phase and batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Cancelled,
    NoSession,
    AlreadyRunning,
    Throttled,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub push: PushReport,
    pub pull: PullReport,
}

impl SyncReport {
    pub fn has_errors(&self) -> bool {
        self.push.error.is_some()
            || !self.push.errors.is_empty()
            || self.pull.error.is_some()
            || self.pull.failed > 0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Ran(SyncReport),
    Skipped { reason: SkipReason },
}

impl SyncOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        SyncOutcome::Skipped { reason }
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            SyncOutcome::Skipped { reason } => Some(*reason),
            SyncOutcome::Ran(_) => None,
        }
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Ran(r) => Some(r),
            SyncOutcome::Skipped { .. } => None,
        }
    }
}
