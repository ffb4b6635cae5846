// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{bail, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::db;
use crate::store::SqliteStore;

static USER_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[1-8][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("static user id regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
}

impl Session {
    /// Remote rows are keyed by UUID user ids; anything else is a local-only
    /// session that must never reach the remote.
    pub fn is_remote_compatible(&self) -> bool {
        is_valid_user_id(&self.id)
    }
}

pub fn is_valid_user_id(id: &str) -> bool {
    USER_ID.is_match(id.trim())
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn get_session(&self) -> Option<Session>;
}

/// Session persisted in the local settings table by `login`.
pub struct StoredSession {
    store: Arc<SqliteStore>,
}

impl StoredSession {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Signs in and claims the local ledger for `user_id`. Entries kept for a
    /// different account would be pushed under this one, so switching
    /// accounts requires a wipe first.
    pub fn login(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.trim();
        let conn = self.store.conn()?;
        if let Some(owner) = db::get_setting(&conn, db::LEDGER_OWNER_KEY)? {
            let held: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
            if owner != user_id && held > 0 {
                bail!(
                    "Local data belongs to another account ({} entr(ies)); run `ledgerline wipe --yes` before signing in as {}",
                    held,
                    user_id
                );
            }
        }
        db::set_setting(&conn, db::LEDGER_OWNER_KEY, user_id)?;
        db::set_setting(&conn, db::SESSION_USER_KEY, user_id)
    }

    pub fn logout(&self) -> Result<()> {
        let conn = self.store.conn()?;
        db::clear_setting(&conn, db::SESSION_USER_KEY)
    }

    fn read(&self) -> Result<Option<Session>> {
        let conn = self.store.conn()?;
        Ok(db::get_setting(&conn, db::SESSION_USER_KEY)?.map(|id| Session { id }))
    }
}

#[async_trait]
impl SessionProvider for StoredSession {
    async fn get_session(&self) -> Option<Session> {
        match self.read() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("could not read session: {:#}", e);
                None
            }
        }
    }
}
