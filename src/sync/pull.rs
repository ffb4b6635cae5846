// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::SyncCoordinator;
use crate::gateway::CallOptions;
use crate::models::{Entry, FetchedRow, RemoteEntry, SyncState, WriteAck};
use crate::utils::{fmt_timestamp, now_millis};

const COLUMNS: &str = "id, user_id, client_id, type, amount, category, note, currency, \
     created_at, updated_at, deleted, server_version, date, device_id";

/// Local timestamps carry milliseconds, so paging compares the remote clock
/// at the same precision.
const STAMP: &str = "date_trunc('milliseconds', updated_at)";

const REVIVE_SQL: &str = "UPDATE entries
SET deleted = false, updated_at = $3::timestamptz, server_version = server_version + 1
WHERE id = $1 AND user_id = $2
RETURNING id, server_version, updated_at";

const EPOCH: &str = "1970-01-01T00:00:00.000Z";

#[derive(Debug, Clone, Default, Serialize)]
pub struct PullReport {
    pub fetched: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub kept_local: usize,
    pub marked_synced: usize,
    pub revived: usize,
    pub deleted: usize,
    pub ignored: usize,
    pub malformed: usize,
    pub failed: usize,
    /// Cursor persisted by this pull, if it moved.
    pub cursor: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    Applied,
    Unchanged,
    KeptLocal,
    MarkedSynced,
    Revived,
    Deleted,
    Ignored,
    Malformed,
}

impl SyncCoordinator {
    pub(super) async fn pull_phase(&self, user_id: &str, state: &SyncState) -> PullReport {
        let mut report = PullReport::default();
        let page_size = self.settings.pull_page_size.max(1);
        let since = state
            .pull_cursor
            .map(|c| fmt_timestamp(&c))
            .unwrap_or_else(|| EPOCH.to_string());

        let mut after: Option<(String, String)> = None;
        let mut cursor = CursorTracker::default();

        loop {
            if self.cancel.is_cancelled() {
                log::info!("pull interrupted by cancellation");
                report.cancelled = true;
                return report;
            }

            let page = match self.fetch_page(user_id, &since, after.as_ref(), page_size).await {
                Ok(p) => p,
                Err(e) => {
                    log::warn!("pull failed: {:#}", e);
                    report.error = Some(format!("{:#}", e));
                    return report;
                }
            };
            let full = page.len() >= page_size;
            report.fetched += page.len();

            for fetched in &page {
                let row = match fetched {
                    FetchedRow::Entry(row) => row,
                    FetchedRow::Unreadable { id, reason, .. } => {
                        log::warn!(
                            "skipping unreadable remote row {}: {}",
                            id.as_deref().unwrap_or("?"),
                            reason
                        );
                        report.malformed += 1;
                        if let Some(t) = fetched.updated_at() {
                            cursor.seen(t);
                        }
                        continue;
                    }
                };
                cursor.seen(row.updated_at);
                match self.merge_row(user_id, row).await {
                    Ok(outcome) => {
                        log::debug!("remote row {}: {:?}", row.id, outcome);
                        match outcome {
                            Merge::Applied => report.applied += 1,
                            Merge::Unchanged => report.unchanged += 1,
                            Merge::KeptLocal => report.kept_local += 1,
                            Merge::MarkedSynced => report.marked_synced += 1,
                            Merge::Revived => report.revived += 1,
                            Merge::Deleted => report.deleted += 1,
                            Merge::Ignored => report.ignored += 1,
                            Merge::Malformed => {
                                log::warn!("skipping malformed remote row {}", row.id);
                                report.malformed += 1;
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!("could not merge remote row {}: {:#}", row.id, e);
                        report.failed += 1;
                        cursor.failed(row.updated_at);
                    }
                }
            }

            // Rows after the last readable key come back on the next page.
            let key = page
                .iter()
                .rev()
                .find_map(|r| Some((r.updated_at()?, r.id()?.to_string())));
            match key {
                Some((stamp, id)) if full => after = Some((fmt_timestamp(&stamp), id)),
                None if full => {
                    log::warn!("remote page has no readable keys; ending pull early");
                    break;
                }
                _ => break,
            }
        }

        if let Some(next) = cursor.next() {
            if state.pull_cursor.is_none_or(|c| next > c) {
                match self.store.save_pull_cursor(user_id, next).await {
                    Ok(()) => report.cursor = Some(next),
                    Err(e) => {
                        log::error!("could not save pull cursor: {:#}", e);
                        report.error = Some(format!("{:#}", e));
                    }
                }
            }
        }
        report
    }

    async fn fetch_page(
        &self,
        user_id: &str,
        since: &str,
        after: Option<&(String, String)>,
        limit: usize,
    ) -> Result<Vec<FetchedRow>> {
        let (sql, params): (String, Vec<Value>) = match after {
            None => (
                format!(
                    "SELECT {COLUMNS} FROM entries
                     WHERE user_id = $1 AND {STAMP} > $2::timestamptz
                     ORDER BY {STAMP}, id LIMIT $3"
                ),
                vec![json!(user_id), json!(since), json!(limit)],
            ),
            Some((stamp, id)) => (
                format!(
                    "SELECT {COLUMNS} FROM entries
                     WHERE user_id = $1
                       AND ({STAMP} > $2::timestamptz
                            OR ({STAMP} = $2::timestamptz AND id > $3))
                     ORDER BY {STAMP}, id LIMIT $4"
                ),
                vec![json!(user_id), json!(stamp), json!(id), json!(limit)],
            ),
        };
        let rows = self
            .gateway
            .execute(&sql, &params, CallOptions::default())
            .await?;
        Ok(rows.into_iter().map(FetchedRow::decode).collect())
    }

    async fn find_local(&self, row: &RemoteEntry) -> Result<Option<Entry>> {
        if let Some(e) = self.store.local_by_remote_id(&row.id).await? {
            return Ok(Some(e));
        }
        match &row.client_id {
            Some(cid) => self.store.local_by_client_id(cid).await,
            None => Ok(None),
        }
    }

    async fn merge_row(&self, user_id: &str, row: &RemoteEntry) -> Result<Merge> {
        let local = self.find_local(row).await?;

        if row.deleted {
            let Some(local) = local else {
                return Ok(Merge::Ignored);
            };
            if local.is_pending() {
                if local.deleted {
                    self.store
                        .mark_entry_synced(
                            local.local_id,
                            &row.id,
                            row.server_version,
                            local.updated_at,
                        )
                        .await?;
                    return Ok(Merge::MarkedSynced);
                }
                // The user is still editing this entry; undo the remote delete.
                let bump = now_millis().max(local.updated_at);
                let acks: Vec<WriteAck> = self
                    .gateway
                    .query_as(
                        REVIVE_SQL,
                        &[json!(row.id), json!(user_id), json!(fmt_timestamp(&bump))],
                        CallOptions::default(),
                    )
                    .await?;
                let version = acks
                    .first()
                    .map(|a| a.server_version)
                    .unwrap_or(row.server_version + 1);
                self.store
                    .link_remote_id(local.local_id, &row.id, version)
                    .await?;
                return Ok(Merge::Revived);
            }
            if local.remote_id.is_none() {
                self.store
                    .link_remote_id(local.local_id, &row.id, row.server_version)
                    .await?;
            }
            self.store.mark_local_deleted_by_remote_id(&row.id).await?;
            return Ok(Merge::Deleted);
        }

        if row.fields().is_err() {
            return Ok(Merge::Malformed);
        }

        match local {
            Some(l) if l.is_pending() => {
                if l.updated_at == row.updated_at {
                    self.store
                        .mark_entry_synced(l.local_id, &row.id, row.server_version, l.updated_at)
                        .await?;
                    Ok(Merge::MarkedSynced)
                } else {
                    Ok(Merge::KeptLocal)
                }
            }
            Some(l)
                if !l.deleted
                    && l.updated_at == row.updated_at
                    && l.server_version == row.server_version
                    && l.remote_id.as_deref() == Some(row.id.as_str()) =>
            {
                Ok(Merge::Unchanged)
            }
            _ => {
                self.store.upsert_local_from_remote(row).await?;
                Ok(Merge::Applied)
            }
        }
    }
}

/// Where the pull cursor may move. Rows arrive in stamp order; the first
/// failed merge pins the cursor to the largest stamp strictly below it.
#[derive(Debug, Default)]
struct CursorTracker {
    max: Option<DateTime<Utc>>,
    below_max: Option<DateTime<Utc>>,
    held: Option<Option<DateTime<Utc>>>,
}

impl CursorTracker {
    fn seen(&mut self, t: DateTime<Utc>) {
        match self.max {
            Some(m) if t <= m => {
                if t < m && self.below_max.is_none_or(|b| t > b) {
                    self.below_max = Some(t);
                }
            }
            _ => {
                self.below_max = self.max;
                self.max = Some(t);
            }
        }
    }

    fn failed(&mut self, t: DateTime<Utc>) {
        if self.held.is_some() {
            return;
        }
        let below = match self.max {
            Some(m) if m < t => Some(m),
            _ => self.below_max.filter(|b| *b < t),
        };
        self.held = Some(below);
    }

    fn next(&self) -> Option<DateTime<Utc>> {
        match self.held {
            Some(held) => held,
            None => self.max,
        }
    }
}
