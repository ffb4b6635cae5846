// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

use super::stream::AggregateRecord;
use crate::gateway::{CallOptions, RemoteGateway};
use crate::models::{Entry, FetchedRow};
use crate::store::LocalStore;

pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// A forward-only source of entry pages. `None` ends the stream.
#[async_trait]
pub trait PageSource: Send {
    type Item: AggregateRecord + Send + Sync;

    async fn next_page(&mut self) -> Result<Option<Vec<Self::Item>>>;
}

/// Live local entries in range, keyed by local id.
pub struct LocalPages {
    store: Arc<dyn LocalStore>,
    start: NaiveDate,
    end: NaiveDate,
    after: i64,
    limit: usize,
    done: bool,
}

impl LocalPages {
    pub fn new(store: Arc<dyn LocalStore>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            store,
            start,
            end,
            after: 0,
            limit: DEFAULT_PAGE_SIZE,
            done: false,
        }
    }

    pub fn with_page_size(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

#[async_trait]
impl PageSource for LocalPages {
    type Item = Entry;

    async fn next_page(&mut self) -> Result<Option<Vec<Entry>>> {
        if self.done {
            return Ok(None);
        }
        let page = self
            .store
            .entries_page(self.start, self.end, self.after, self.limit)
            .await?;
        if page.len() < self.limit {
            self.done = true;
        }
        match page.last() {
            Some(last) => {
                self.after = last.local_id;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }
}

/// Live remote entries of one user in range, keyed by remote id. Rows that
/// do not decode are handed on as [`FetchedRow::Unreadable`] and skipped by
/// the aggregation.
pub struct RemotePages {
    gateway: Arc<RemoteGateway>,
    user_id: String,
    start: NaiveDate,
    end: NaiveDate,
    after: Option<String>,
    limit: usize,
    done: bool,
}

impl RemotePages {
    pub fn new(
        gateway: Arc<RemoteGateway>,
        user_id: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        Self {
            gateway,
            user_id: user_id.into(),
            start,
            end,
            after: None,
            limit: DEFAULT_PAGE_SIZE,
            done: false,
        }
    }

    pub fn with_page_size(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

#[async_trait]
impl PageSource for RemotePages {
    type Item = FetchedRow;

    async fn next_page(&mut self) -> Result<Option<Vec<FetchedRow>>> {
        if self.done {
            return Ok(None);
        }
        let base = "SELECT id, user_id, client_id, type, amount, category, note, currency, \
                    created_at, updated_at, deleted, server_version, date, device_id \
                    FROM entries \
                    WHERE user_id = $1 AND deleted = false \
                      AND date >= $2::date AND date <= $3::date";
        let mut params = vec![
            json!(self.user_id),
            json!(self.start.to_string()),
            json!(self.end.to_string()),
        ];
        let sql = match &self.after {
            Some(after) => {
                params.push(json!(after));
                params.push(json!(self.limit));
                format!("{base} AND id > $4 ORDER BY id LIMIT $5")
            }
            None => {
                params.push(json!(self.limit));
                format!("{base} ORDER BY id LIMIT $4")
            }
        };
        let page: Vec<FetchedRow> = self
            .gateway
            .execute(&sql, &params, CallOptions::default())
            .await?
            .into_iter()
            .map(FetchedRow::decode)
            .collect();
        if page.is_empty() {
            return Ok(None);
        }
        if page.len() < self.limit {
            self.done = true;
        }
        match page.iter().rev().find_map(FetchedRow::id) {
            Some(id) => self.after = Some(id.to_string()),
            None => {
                log::warn!("remote page has no readable ids; stopping early");
                self.done = true;
            }
        }
        Ok(Some(page))
    }
}
