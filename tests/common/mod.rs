// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use ledgerline::gateway::{
    GatewayError, GatewaySettings, NetworkState, Reachability, RemoteGateway, RemoteTransport, Row,
};
use ledgerline::session::{Session, SessionProvider};
use ledgerline::store::SqliteStore;
use ledgerline::utils::{fmt_timestamp, parse_timestamp};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const USER: &str = "6f1c2b7e-3d4a-4b8c-9e0f-1a2b3c4d5e6f";

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn ts(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap()
}

pub fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().unwrap())
}

/// Settings with short delays so retry loops finish quickly.
pub fn fast_settings() -> GatewaySettings {
    GatewaySettings {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        ..GatewaySettings::default()
    }
}

pub fn gateway(transport: Arc<dyn RemoteTransport>, reach: Arc<dyn Reachability>) -> Arc<RemoteGateway> {
    Arc::new(RemoteGateway::new(Some(transport), reach, fast_settings()))
}

/// Counts probes and answers with a switchable state.
pub struct CountingReachability {
    pub probes: AtomicUsize,
    pub online: AtomicBool,
}

impl CountingReachability {
    pub fn online() -> Arc<Self> {
        Arc::new(Self {
            probes: AtomicUsize::new(0),
            online: AtomicBool::new(true),
        })
    }

    pub fn offline() -> Arc<Self> {
        let r = Self::online();
        r.online.store(false, Ordering::SeqCst);
        r
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reachability for CountingReachability {
    async fn probe(&self) -> NetworkState {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let up = self.online.load(Ordering::SeqCst);
        NetworkState {
            connected: up,
            reachable: up,
        }
    }
}

pub struct StaticSession(pub Option<String>);

impl StaticSession {
    pub fn user() -> Arc<Self> {
        Arc::new(Self(Some(USER.to_string())))
    }

    pub fn none() -> Arc<Self> {
        Arc::new(Self(None))
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn get_session(&self) -> Option<Session> {
        self.0.clone().map(|id| Session { id })
    }
}

type Handler = dyn Fn(&str, &[Value]) -> Result<Vec<Row>, GatewayError> + Send + Sync;

/// Replays queued responses, then falls back to a handler (empty rows by
/// default). Every call is recorded.
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Result<Vec<Row>, GatewayError>>>,
    handler: Option<Box<Handler>>,
    /// Each call sleeps this long first; paired with a paused clock to
    /// trigger timeouts.
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            handler: None,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handler(
        f: impl Fn(&str, &[Value]) -> Result<Vec<Row>, GatewayError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Some(Box::new(f)),
            ..Self::new()
        }
    }

    pub fn push(&self, r: Result<Vec<Row>, GatewayError>) {
        self.queue.lock().unwrap().push_back(r);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, GatewayError> {
        self.calls.lock().unwrap().push(sql.to_string());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if let Some(r) = self.queue.lock().unwrap().pop_front() {
            return r;
        }
        match &self.handler {
            Some(h) => h(sql, params),
            None => Ok(Vec::new()),
        }
    }
}

pub fn row(v: Value) -> Row {
    v.as_object().cloned().unwrap()
}

#[derive(Debug, Clone)]
pub struct RemoteRow {
    pub id: String,
    pub user_id: String,
    pub client_id: Option<String>,
    pub entry_type: String,
    pub amount: String,
    pub category: Option<String>,
    pub note: Option<String>,
    pub currency: Option<String>,
    pub date: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
    pub server_version: i64,
    pub device_id: Option<String>,
    /// Raw column values written over the row as served, for rows the
    /// typed fields cannot express.
    pub raw: Vec<(&'static str, Value)>,
}

impl RemoteRow {
    pub fn new(id: &str, client_id: &str, amount: &str, updated_at: &str) -> Self {
        Self {
            id: id.to_string(),
            user_id: USER.to_string(),
            client_id: Some(client_id.to_string()),
            entry_type: "out".into(),
            amount: amount.to_string(),
            category: Some("Food".into()),
            note: None,
            currency: Some("INR".into()),
            date: "2026-03-01".into(),
            created_at: ts(updated_at),
            updated_at: ts(updated_at),
            deleted: false,
            server_version: 1,
            device_id: Some("other-device".into()),
            raw: Vec::new(),
        }
    }

    pub fn with_raw(mut self, column: &'static str, value: Value) -> Self {
        self.raw.push((column, value));
        self
    }

    fn to_row(&self) -> Row {
        let mut out = row(json!({
            "id": self.id,
            "user_id": self.user_id,
            "client_id": self.client_id,
            "type": self.entry_type,
            "amount": self.amount,
            "category": self.category,
            "note": self.note,
            "currency": self.currency,
            "created_at": fmt_timestamp(&self.created_at),
            "updated_at": fmt_timestamp(&self.updated_at),
            "deleted": self.deleted,
            "server_version": self.server_version,
            "date": self.date,
            "device_id": self.device_id,
        }));
        for (column, value) in &self.raw {
            out.insert(column.to_string(), value.clone());
        }
        out
    }

    fn ack(&self) -> Row {
        row(json!({
            "id": self.id,
            "server_version": self.server_version,
            "updated_at": fmt_timestamp(&self.updated_at),
        }))
    }
}

/// In-memory stand-in for the remote `entries` table that understands the
/// statements the sync engine sends.
#[derive(Default)]
pub struct FakeRemote {
    pub rows: Mutex<Vec<RemoteRow>>,
    pub statements: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    /// Inserts and updates from push fail with a permanent error.
    pub reject_writes: AtomicBool,
    /// Acks report an `updated_at` this many ms later than what was written.
    pub ack_skew_ms: Mutex<i64>,
    /// Revives of remotely deleted rows fail with a permanent error.
    pub reject_revive: AtomicBool,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, r: RemoteRow) {
        self.rows.lock().unwrap().push(r);
    }

    pub fn get(&self, id: &str) -> Option<RemoteRow> {
        self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn by_client(&self, client_id: &str) -> Option<RemoteRow> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.client_id.as_deref() == Some(client_id))
            .cloned()
    }

    pub fn update(&self, id: &str, f: impl FnOnce(&mut RemoteRow)) {
        let mut rows = self.rows.lock().unwrap();
        let r = rows.iter_mut().find(|r| r.id == id).unwrap();
        f(r);
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }

    fn rejected() -> GatewayError {
        GatewayError::Database {
            code: Some("42501".into()),
            message: "permission denied for table entries".into(),
        }
    }

    fn skewed(&self, mut ack: Row) -> Row {
        let skew = *self.ack_skew_ms.lock().unwrap();
        if skew != 0 {
            let at = ts(ack["updated_at"].as_str().unwrap()) + ChronoDuration::milliseconds(skew);
            ack.insert("updated_at".into(), json!(fmt_timestamp(&at)));
        }
        ack
    }

    fn handle(&self, sql: &str, p: &[Value]) -> Result<Vec<Row>, GatewayError> {
        let s = |i: usize| p[i].as_str().map(str::to_string);
        let sql = sql.trim_start();

        if sql.starts_with("INSERT INTO entries") {
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(Self::rejected());
            }
            let client_id = s(1).unwrap();
            let mut rows = self.rows.lock().unwrap();
            let written = RemoteRow {
                id: String::new(),
                user_id: s(0).unwrap(),
                client_id: Some(client_id.clone()),
                entry_type: s(2).unwrap(),
                amount: s(3).unwrap(),
                category: s(4),
                note: s(5),
                currency: s(6),
                date: s(7).unwrap(),
                created_at: ts(&s(8).unwrap()),
                updated_at: ts(&s(9).unwrap()),
                deleted: p[11].as_bool().unwrap(),
                server_version: 1,
                device_id: s(10),
                raw: Vec::new(),
            };
            let ack = match rows
                .iter_mut()
                .find(|r| r.client_id.as_deref() == Some(client_id.as_str()))
            {
                Some(existing) => {
                    let version = existing.server_version + 1;
                    *existing = RemoteRow {
                        id: existing.id.clone(),
                        created_at: existing.created_at,
                        server_version: version,
                        ..written
                    };
                    existing.ack()
                }
                None => {
                    let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    let r = RemoteRow {
                        id: format!("r{:05}", n),
                        ..written
                    };
                    let ack = r.ack();
                    rows.push(r);
                    ack
                }
            };
            return Ok(vec![self.skewed(ack)]);
        }

        if sql.starts_with("UPDATE entries") && sql.contains("SET deleted = false") {
            if self.reject_revive.load(Ordering::SeqCst) {
                return Err(Self::rejected());
            }
            let mut rows = self.rows.lock().unwrap();
            let Some(r) = rows
                .iter_mut()
                .find(|r| Some(&r.id) == s(0).as_ref() && Some(&r.user_id) == s(1).as_ref())
            else {
                return Ok(Vec::new());
            };
            r.deleted = false;
            r.updated_at = ts(&s(2).unwrap());
            r.server_version += 1;
            return Ok(vec![r.ack()]);
        }

        if sql.starts_with("UPDATE entries SET") {
            if self.reject_writes.load(Ordering::SeqCst) {
                return Err(Self::rejected());
            }
            let mut rows = self.rows.lock().unwrap();
            let Some(r) = rows
                .iter_mut()
                .find(|r| Some(&r.id) == s(0).as_ref() && Some(&r.user_id) == s(1).as_ref())
            else {
                return Ok(Vec::new());
            };
            r.entry_type = s(2).unwrap();
            r.amount = s(3).unwrap();
            r.category = s(4);
            r.note = s(5);
            r.currency = s(6);
            r.date = s(7).unwrap();
            r.updated_at = ts(&s(8).unwrap());
            r.device_id = s(9);
            r.deleted = p[10].as_bool().unwrap();
            r.server_version += 1;
            let ack = r.ack();
            drop(rows);
            return Ok(vec![self.skewed(ack)]);
        }

        if sql.starts_with("SELECT") && sql.contains("date_trunc") {
            let user = s(0).unwrap();
            let since = ts(&s(1).unwrap());
            let (after_id, limit) = if p.len() == 4 {
                (s(2), p[3].as_u64().unwrap() as usize)
            } else {
                (None, p[2].as_u64().unwrap() as usize)
            };
            let mut out: Vec<RemoteRow> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id == user)
                .filter(|r| match &after_id {
                    None => r.updated_at > since,
                    Some(id) => r.updated_at > since || (r.updated_at == since && &r.id > id),
                })
                .cloned()
                .collect();
            out.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
            return Ok(out.iter().take(limit).map(RemoteRow::to_row).collect());
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl RemoteTransport for FakeRemote {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, GatewayError> {
        self.statements
            .lock()
            .unwrap()
            .push(sql.trim_start().to_string());
        self.handle(sql, params)
    }
}
