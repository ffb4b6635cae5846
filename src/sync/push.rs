// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::SyncCoordinator;
use crate::gateway::{CallOptions, GatewayError};
use crate::models::{Entry, SyncState, WriteAck};
use crate::utils::fmt_timestamp;

/// Creates converge on `client_id`: a retried or duplicated insert updates
/// the row that already exists instead of failing.
const UPSERT_SQL: &str = "INSERT INTO entries
    (user_id, client_id, type, amount, category, note, currency, date,
     created_at, updated_at, device_id, deleted, server_version)
VALUES ($1, $2, $3, $4::numeric, $5, $6, $7, $8::date,
        $9::timestamptz, $10::timestamptz, $11, $12, 1)
ON CONFLICT (client_id) DO UPDATE SET
    type = EXCLUDED.type,
    amount = EXCLUDED.amount,
    category = EXCLUDED.category,
    note = EXCLUDED.note,
    currency = EXCLUDED.currency,
    date = EXCLUDED.date,
    updated_at = EXCLUDED.updated_at,
    device_id = EXCLUDED.device_id,
    deleted = EXCLUDED.deleted,
    server_version = entries.server_version + 1
WHERE entries.user_id = EXCLUDED.user_id
RETURNING id, server_version, updated_at";

const UPDATE_SQL: &str = "UPDATE entries SET
    type = $3, amount = $4::numeric, category = $5, note = $6, currency = $7,
    date = $8::date, updated_at = $9::timestamptz, device_id = $10, deleted = $11,
    server_version = server_version + 1
WHERE id = $1 AND user_id = $2
RETURNING id, server_version, updated_at";

#[derive(Debug, Clone, Default, Serialize)]
pub struct PushReport {
    pub attempted: usize,
    /// Acknowledged and marked synced.
    pub pushed: usize,
    /// Acknowledged but edited meanwhile; linked to the remote row and left
    /// pending.
    pub linked: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// Set when the phase stopped early because the remote is unavailable.
    pub error: Option<String>,
    pub aborted: bool,
}

/// Upload order: deletes, then updates newer than the last push, then the
/// remaining updates, then creates. Ties go by `updated_at`, then local id.
pub fn push_order(mut entries: Vec<Entry>, watermark: Option<DateTime<Utc>>) -> Vec<Entry> {
    let tier = |e: &Entry| -> u8 {
        if e.deleted {
            0
        } else if e.remote_id.is_some() {
            match watermark {
                Some(w) if e.updated_at <= w => 2,
                _ => 1,
            }
        } else {
            3
        }
    };
    entries.sort_by(|a, b| {
        tier(a)
            .cmp(&tier(b))
            .then(a.updated_at.cmp(&b.updated_at))
            .then(a.local_id.cmp(&b.local_id))
    });
    entries
}

impl SyncCoordinator {
    pub(super) async fn push_phase(&self, user_id: &str, state: &SyncState) -> PushReport {
        let mut report = PushReport::default();
        let pending = match self.store.unsynced_entries().await {
            Ok(p) => p,
            Err(e) => {
                log::error!("could not read pending entries: {:#}", e);
                report.error = Some(format!("{:#}", e));
                return report;
            }
        };
        if pending.is_empty() {
            log::debug!("nothing to push");
            return report;
        }
        log::info!("pushing {} pending entr(ies)", pending.len());

        let mut watermark = state.push_watermark;
        for entry in push_order(pending, state.push_watermark) {
            if self.cancel.is_cancelled() {
                log::info!("push interrupted by cancellation");
                report.aborted = true;
                break;
            }
            report.attempted += 1;

            let ack = match self.push_one(user_id, &entry).await {
                Ok(ack) => ack,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("entry {}: {}", entry.local_id, e));
                    if e.is_unavailable() {
                        log::warn!("remote unavailable, stopping push: {}", e);
                        report.error = Some(e.to_string());
                        report.aborted = true;
                        break;
                    }
                    log::warn!("push of entry {} failed: {}", entry.local_id, e);
                    continue;
                }
            };

            match self.record_ack(&entry, &ack).await {
                Ok(true) => report.pushed += 1,
                Ok(false) => report.linked += 1,
                Err(e) => {
                    log::error!("could not record ack for entry {}: {:#}", entry.local_id, e);
                    report.failed += 1;
                    report.errors.push(format!("entry {}: {:#}", entry.local_id, e));
                    continue;
                }
            }
            if watermark.is_none_or(|w| entry.updated_at > w) {
                watermark = Some(entry.updated_at);
            }
        }

        if let Some(w) = watermark {
            if Some(w) != state.push_watermark {
                if let Err(e) = self.store.save_push_watermark(user_id, w).await {
                    log::warn!("could not save push watermark: {:#}", e);
                }
            }
        }
        report
    }

    async fn push_one(&self, user_id: &str, entry: &Entry) -> Result<WriteAck, GatewayError> {
        if let Some(remote_id) = &entry.remote_id {
            let params = update_params(user_id, remote_id, entry);
            let acks: Vec<WriteAck> = self
                .gateway
                .query_as(UPDATE_SQL, &params, CallOptions::default())
                .await?;
            if let Some(ack) = acks.into_iter().next() {
                return Ok(ack);
            }
            log::debug!(
                "remote row {} is gone; re-inserting entry {}",
                remote_id,
                entry.local_id
            );
        }
        let params = upsert_params(user_id, entry);
        let acks: Vec<WriteAck> = self
            .gateway
            .query_as(UPSERT_SQL, &params, CallOptions::default())
            .await?;
        acks.into_iter()
            .next()
            .ok_or_else(|| GatewayError::Decode("write was not acknowledged".into()))
    }

    /// Returns whether the entry ended up synced.
    async fn record_ack(&self, entry: &Entry, ack: &WriteAck) -> anyhow::Result<bool> {
        if ack.updated_at == entry.updated_at
            && self
                .store
                .mark_entry_synced(entry.local_id, &ack.id, ack.server_version, entry.updated_at)
                .await?
        {
            log::debug!("entry {} synced as {}", entry.local_id, ack.id);
            return Ok(true);
        }
        log::debug!(
            "entry {} changed while uploading; keeping it pending",
            entry.local_id
        );
        self.store
            .link_remote_id(entry.local_id, &ack.id, ack.server_version)
            .await?;
        Ok(false)
    }
}

fn upsert_params(user_id: &str, e: &Entry) -> Vec<Value> {
    vec![
        json!(user_id),
        json!(e.client_id),
        json!(e.entry_type.as_str()),
        json!(e.amount().to_string()),
        json!(e.category),
        json!(e.note),
        json!(e.currency),
        json!(e.date.to_string()),
        json!(fmt_timestamp(&e.created_at)),
        json!(fmt_timestamp(&e.updated_at)),
        json!(e.device_id),
        json!(e.deleted),
    ]
}

fn update_params(user_id: &str, remote_id: &str, e: &Entry) -> Vec<Value> {
    vec![
        json!(remote_id),
        json!(user_id),
        json!(e.entry_type.as_str()),
        json!(e.amount().to_string()),
        json!(e.category),
        json!(e.note),
        json!(e.currency),
        json!(e.date.to_string()),
        json!(fmt_timestamp(&e.updated_at)),
        json!(e.device_id),
        json!(e.deleted),
    ]
}
