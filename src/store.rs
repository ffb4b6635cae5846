// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Local entry store: the offline copy of entries plus sync metadata.
//!
//! The sync engine and aggregate service only see [`LocalStore`].
//! [`SqliteStore`] implements it over a single rusqlite connection and also
//! carries the local CRUD used by the CLI.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::db;
use crate::models::{
    DailySummary, Entry, EntryPatch, NewEntry, RemoteEntry, SummaryPeriod, SyncState, SyncStatus,
};
use crate::utils::{
    fmt_timestamp, normalize_category, normalize_currency, now_millis, parse_date,
    parse_timestamp, to_minor_units,
};

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn unsynced_entries(&self) -> Result<Vec<Entry>>;

    /// Writes a remote row over the matching local row (by remote id, then
    /// client id) or inserts it; the result is marked synced.
    async fn upsert_local_from_remote(&self, row: &RemoteEntry) -> Result<()>;

    /// Marks the row synced only if its `updated_at` still equals the
    /// acknowledged one. Returns whether it did.
    async fn mark_entry_synced(
        &self,
        local_id: i64,
        remote_id: &str,
        server_version: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Records the remote identity of a row without changing its status.
    async fn link_remote_id(&self, local_id: i64, remote_id: &str, server_version: i64)
    -> Result<()>;

    async fn mark_local_deleted_by_remote_id(&self, remote_id: &str) -> Result<bool>;

    async fn local_by_remote_id(&self, remote_id: &str) -> Result<Option<Entry>>;

    async fn local_by_client_id(&self, client_id: &str) -> Result<Option<Entry>>;

    /// Precomputed totals in `[start, end]`. Monthly rows are keyed by the
    /// first day of the month.
    async fn summaries(
        &self,
        period: SummaryPeriod,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySummary>>;

    async fn store_summaries(&self, rows: &[DailySummary]) -> Result<()>;

    /// Live entries in range ordered by local id, strictly after `after_local_id`.
    async fn entries_page(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        after_local_id: i64,
        limit: usize,
    ) -> Result<Vec<Entry>>;

    /// Outflow minor units per category, largest first.
    async fn category_totals(&self, start: NaiveDate, end: NaiveDate)
    -> Result<Vec<(String, i64)>>;

    /// Largest single inflow and outflow in range.
    async fn max_amounts(&self, start: NaiveDate, end: NaiveDate) -> Result<(i64, i64)>;

    async fn sync_state(&self, user_id: &str) -> Result<SyncState>;

    async fn save_pull_cursor(&self, user_id: &str, cursor: DateTime<Utc>) -> Result<()>;

    async fn save_push_watermark(&self, user_id: &str, watermark: DateTime<Utc>) -> Result<()>;

    async fn mark_sync_completed(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;
}

const ENTRY_COLS: &str = "local_id, remote_id, client_id, amount_minor, type, category, note, \
     currency, date, created_at, updated_at, device_id, deleted, server_version, sync_status";

/// Filters for `entry list` / export.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub pending_only: bool,
    pub include_deleted: bool,
    pub limit: Option<usize>,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    device_id: String,
}

impl SqliteStore {
    pub fn new(mut conn: Connection) -> Result<Self> {
        db::init_schema(&mut conn)?;
        let device_id = db::device_id(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            device_id,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::new(db::open_or_init(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Direct access for commands that read settings or run ad-hoc checks.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("local store connection poisoned"))
    }

    pub fn create_entry(&self, new: &NewEntry) -> Result<Entry> {
        if new.amount.is_sign_negative() {
            return Err(anyhow!(
                "Amount must be non-negative; use the entry type for direction"
            ));
        }
        let now = now_millis();
        let client_id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO entries(client_id, amount_minor, type, category, note, currency, date,
                                 created_at, updated_at, device_id, deleted, server_version, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9, 0, 0, 'pending')",
            params![
                client_id,
                to_minor_units(new.amount),
                new.entry_type.as_str(),
                normalize_category(new.category.as_deref()),
                new.note.as_deref(),
                normalize_currency(new.currency.as_deref()),
                new.date.to_string(),
                fmt_timestamp(&now),
                self.device_id,
            ],
        )?;
        let local_id = conn.last_insert_rowid();
        refresh_summary(&conn, new.date)?;
        get_entry(&conn, local_id)?.context("entry vanished after insert")
    }

    pub fn update_entry(&self, local_id: i64, patch: &EntryPatch) -> Result<Entry> {
        let conn = self.conn()?;
        let cur = get_entry(&conn, local_id)?
            .with_context(|| format!("Entry {} not found", local_id))?;
        if cur.deleted {
            return Err(anyhow!("Entry {} is deleted", local_id));
        }
        let amount_minor = match patch.amount {
            Some(a) if a.is_sign_negative() => {
                return Err(anyhow!(
                    "Amount must be non-negative; use the entry type for direction"
                ));
            }
            Some(a) => to_minor_units(a),
            None => cur.amount_minor,
        };
        let date = patch.date.unwrap_or(cur.date);
        let note = match &patch.note {
            Some(n) => n.clone(),
            None => cur.note.clone(),
        };
        let updated_at = next_update_stamp(cur.updated_at);
        conn.execute(
            "UPDATE entries SET amount_minor=?1, type=?2, category=?3, note=?4, currency=?5, date=?6,
                    updated_at=?7, device_id=?8, sync_status='pending'
             WHERE local_id=?9",
            params![
                amount_minor,
                patch.entry_type.unwrap_or(cur.entry_type).as_str(),
                match &patch.category {
                    Some(c) => normalize_category(Some(c)),
                    None => cur.category.clone(),
                },
                note,
                match &patch.currency {
                    Some(c) => normalize_currency(Some(c)),
                    None => cur.currency.clone(),
                },
                date.to_string(),
                fmt_timestamp(&updated_at),
                self.device_id,
                local_id,
            ],
        )?;
        refresh_summary(&conn, cur.date)?;
        if date != cur.date {
            refresh_summary(&conn, date)?;
        }
        get_entry(&conn, local_id)?.context("entry vanished after update")
    }

    /// Soft delete; the row stays until the remote confirms the delete.
    pub fn soft_delete_entry(&self, local_id: i64) -> Result<Entry> {
        let conn = self.conn()?;
        let cur = get_entry(&conn, local_id)?
            .with_context(|| format!("Entry {} not found", local_id))?;
        let updated_at = next_update_stamp(cur.updated_at);
        conn.execute(
            "UPDATE entries SET deleted=1, updated_at=?1, device_id=?2, sync_status='pending'
             WHERE local_id=?3",
            params![fmt_timestamp(&updated_at), self.device_id, local_id],
        )?;
        refresh_summary(&conn, cur.date)?;
        get_entry(&conn, local_id)?.context("entry vanished after delete")
    }

    pub fn get_entry(&self, local_id: i64) -> Result<Option<Entry>> {
        let conn = self.conn()?;
        get_entry(&conn, local_id)
    }

    pub fn list_entries(&self, filter: &EntryFilter) -> Result<Vec<Entry>> {
        let mut sql = format!("SELECT {} FROM entries WHERE 1=1", ENTRY_COLS);
        let mut params_vec: Vec<String> = Vec::new();
        if !filter.include_deleted {
            sql.push_str(" AND deleted=0");
        }
        if filter.pending_only {
            sql.push_str(" AND sync_status='pending'");
        }
        if let Some(from) = filter.from {
            sql.push_str(" AND date>=?");
            params_vec.push(from.to_string());
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND date<=?");
            params_vec.push(to.to_string());
        }
        sql.push_str(" ORDER BY date DESC, local_id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            params_vec.push(limit.to_string());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), row_to_entry)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn pending_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE sync_status='pending'",
            [],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    /// Hard delete of everything tied to the account. Only used when the
    /// account itself is deleted.
    pub fn wipe_all(&self) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM daily_summaries", [])?;
        tx.execute("DELETE FROM sync_state", [])?;
        tx.execute(
            "DELETE FROM settings WHERE key IN (?1, ?2)",
            params![db::SESSION_USER_KEY, db::LEDGER_OWNER_KEY],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn unsynced_entries(&self) -> Result<Vec<Entry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries WHERE sync_status='pending' ORDER BY local_id",
            ENTRY_COLS
        ))?;
        let rows = stmt.query_map([], row_to_entry)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn upsert_local_from_remote(&self, row: &RemoteEntry) -> Result<()> {
        let f = row
            .fields()
            .with_context(|| format!("Malformed remote row {}", row.id))?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT local_id, date FROM entries WHERE remote_id=?1",
                params![row.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let existing = match (existing, &row.client_id) {
            (Some(hit), _) => Some(hit),
            (None, Some(cid)) => tx
                .query_row(
                    "SELECT local_id, date FROM entries WHERE client_id=?1",
                    params![cid],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?,
            (None, None) => None,
        };
        let updated_at = fmt_timestamp(&row.updated_at);
        let created_at = fmt_timestamp(&row.created_at.unwrap_or(row.updated_at));
        match existing {
            Some((local_id, old_date)) => {
                tx.execute(
                    "UPDATE entries SET remote_id=?1, amount_minor=?2, type=?3, category=?4, note=?5,
                            currency=?6, date=?7, updated_at=?8, device_id=?9, deleted=?10,
                            server_version=?11, sync_status='synced'
                     WHERE local_id=?12",
                    params![
                        row.id,
                        f.amount_minor,
                        f.entry_type.as_str(),
                        f.category,
                        row.note,
                        f.currency,
                        f.date.to_string(),
                        updated_at,
                        row.device_id,
                        row.deleted,
                        row.server_version,
                        local_id,
                    ],
                )?;
                let old_date = parse_date(&old_date)?;
                refresh_summary(&tx, old_date)?;
                if old_date != f.date {
                    refresh_summary(&tx, f.date)?;
                }
            }
            None => {
                let client_id = row
                    .client_id
                    .clone()
                    .unwrap_or_else(|| format!("remote:{}", row.id));
                tx.execute(
                    "INSERT INTO entries(remote_id, client_id, amount_minor, type, category, note,
                                         currency, date, created_at, updated_at, device_id, deleted,
                                         server_version, sync_status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'synced')",
                    params![
                        row.id,
                        client_id,
                        f.amount_minor,
                        f.entry_type.as_str(),
                        f.category,
                        row.note,
                        f.currency,
                        f.date.to_string(),
                        created_at,
                        updated_at,
                        row.device_id,
                        row.deleted,
                        row.server_version,
                    ],
                )?;
                refresh_summary(&tx, f.date)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn mark_entry_synced(
        &self,
        local_id: i64,
        remote_id: &str,
        server_version: i64,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE entries SET remote_id=?1, server_version=?2, sync_status='synced'
             WHERE local_id=?3 AND updated_at=?4",
            params![remote_id, server_version, local_id, fmt_timestamp(&updated_at)],
        )?;
        Ok(n > 0)
    }

    async fn link_remote_id(
        &self,
        local_id: i64,
        remote_id: &str,
        server_version: i64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE entries SET remote_id=?1, server_version=?2 WHERE local_id=?3",
            params![remote_id, server_version, local_id],
        )?;
        Ok(())
    }

    async fn mark_local_deleted_by_remote_id(&self, remote_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let date: Option<String> = conn
            .query_row(
                "SELECT date FROM entries WHERE remote_id=?1",
                params![remote_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(date) = date else {
            return Ok(false);
        };
        conn.execute(
            "UPDATE entries SET deleted=1, sync_status='synced' WHERE remote_id=?1",
            params![remote_id],
        )?;
        refresh_summary(&conn, parse_date(&date)?)?;
        Ok(true)
    }

    async fn local_by_remote_id(&self, remote_id: &str) -> Result<Option<Entry>> {
        let conn = self.conn()?;
        let e = conn
            .query_row(
                &format!("SELECT {} FROM entries WHERE remote_id=?1", ENTRY_COLS),
                params![remote_id],
                row_to_entry,
            )
            .optional()?;
        Ok(e)
    }

    async fn local_by_client_id(&self, client_id: &str) -> Result<Option<Entry>> {
        let conn = self.conn()?;
        let e = conn
            .query_row(
                &format!("SELECT {} FROM entries WHERE client_id=?1", ENTRY_COLS),
                params![client_id],
                row_to_entry,
            )
            .optional()?;
        Ok(e)
    }

    async fn summaries(
        &self,
        period: SummaryPeriod,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailySummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT date, inflow_minor, outflow_minor, count FROM daily_summaries
             WHERE date>=?1 AND date<=?2 ORDER BY date",
        )?;
        let rows = stmt.query_map(params![start.to_string(), end.to_string()], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, i64>(3)?,
            ))
        })?;
        let mut daily = Vec::new();
        for row in rows {
            let (d, inflow_minor, outflow_minor, count) = row?;
            daily.push(DailySummary {
                date: parse_date(&d)?,
                inflow_minor,
                outflow_minor,
                count,
            });
        }
        match period {
            SummaryPeriod::Day => Ok(daily),
            SummaryPeriod::Month => {
                let mut months: BTreeMap<NaiveDate, DailySummary> = BTreeMap::new();
                for s in daily {
                    let key = s.date.with_day(1).unwrap_or(s.date);
                    let m = months.entry(key).or_insert(DailySummary {
                        date: key,
                        inflow_minor: 0,
                        outflow_minor: 0,
                        count: 0,
                    });
                    m.inflow_minor += s.inflow_minor;
                    m.outflow_minor += s.outflow_minor;
                    m.count += s.count;
                }
                Ok(months.into_values().collect())
            }
        }
    }

    async fn store_summaries(&self, rows: &[DailySummary]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for s in rows {
            tx.execute(
                "INSERT INTO daily_summaries(date, inflow_minor, outflow_minor, count)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(date) DO UPDATE SET inflow_minor=excluded.inflow_minor,
                     outflow_minor=excluded.outflow_minor, count=excluded.count",
                params![s.date.to_string(), s.inflow_minor, s.outflow_minor, s.count],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn entries_page(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        after_local_id: i64,
        limit: usize,
    ) -> Result<Vec<Entry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries
             WHERE deleted=0 AND date>=?1 AND date<=?2 AND local_id>?3
             ORDER BY local_id LIMIT ?4",
            ENTRY_COLS
        ))?;
        let rows = stmt.query_map(
            params![start.to_string(), end.to_string(), after_local_id, limit as i64],
            row_to_entry,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn category_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, SUM(amount_minor) AS spent FROM entries
             WHERE deleted=0 AND type='out' AND date>=?1 AND date<=?2
             GROUP BY category ORDER BY spent DESC, category",
        )?;
        let rows = stmt.query_map(params![start.to_string(), end.to_string()], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn max_amounts(&self, start: NaiveDate, end: NaiveDate) -> Result<(i64, i64)> {
        let conn = self.conn()?;
        let maxes = conn.query_row(
            "SELECT COALESCE(MAX(CASE WHEN type='in' THEN amount_minor END), 0),
                    COALESCE(MAX(CASE WHEN type='out' THEN amount_minor END), 0)
             FROM entries WHERE deleted=0 AND date>=?1 AND date<=?2",
            params![start.to_string(), end.to_string()],
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
        )?;
        Ok(maxes)
    }

    async fn sync_state(&self, user_id: &str) -> Result<SyncState> {
        let conn = self.conn()?;
        let row: Option<(Option<String>, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT pull_cursor, push_watermark, last_sync_at FROM sync_state WHERE user_id=?1",
                params![user_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((cursor, watermark, last)) = row else {
            return Ok(SyncState::default());
        };
        Ok(SyncState {
            pull_cursor: cursor.as_deref().map(parse_timestamp).transpose()?,
            push_watermark: watermark.as_deref().map(parse_timestamp).transpose()?,
            last_sync_at: last.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    async fn save_pull_cursor(&self, user_id: &str, cursor: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state(user_id, pull_cursor) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET pull_cursor=excluded.pull_cursor",
            params![user_id, fmt_timestamp(&cursor)],
        )?;
        Ok(())
    }

    async fn save_push_watermark(&self, user_id: &str, watermark: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state(user_id, push_watermark) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET push_watermark=excluded.push_watermark",
            params![user_id, fmt_timestamp(&watermark)],
        )?;
        Ok(())
    }

    async fn mark_sync_completed(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_state(user_id, last_sync_at) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET last_sync_at=excluded.last_sync_at",
            params![user_id, fmt_timestamp(&at)],
        )?;
        Ok(())
    }
}

fn get_entry(conn: &Connection, local_id: i64) -> Result<Option<Entry>> {
    let e = conn
        .query_row(
            &format!("SELECT {} FROM entries WHERE local_id=?1", ENTRY_COLS),
            params![local_id],
            row_to_entry,
        )
        .optional()?;
    Ok(e)
}

/// Recomputes the precomputed row for one day from live entries.
fn refresh_summary(conn: &Connection, date: NaiveDate) -> Result<()> {
    conn.execute(
        "INSERT INTO daily_summaries(date, inflow_minor, outflow_minor, count)
         SELECT ?1,
                COALESCE(SUM(CASE WHEN type='in' THEN amount_minor END), 0),
                COALESCE(SUM(CASE WHEN type='out' THEN amount_minor END), 0),
                COUNT(*)
         FROM entries WHERE date=?1 AND deleted=0
         ON CONFLICT(date) DO UPDATE SET inflow_minor=excluded.inflow_minor,
             outflow_minor=excluded.outflow_minor, count=excluded.count",
        params![date.to_string()],
    )?;
    Ok(())
}

/// Edits must move `updated_at` forward even within the same millisecond.
fn next_update_stamp(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_millis();
    if now > prev {
        now
    } else {
        prev + Duration::milliseconds(1)
    }
}

fn row_to_entry(r: &Row<'_>) -> rusqlite::Result<Entry> {
    fn conv<T, E: std::fmt::Display>(idx: usize, v: std::result::Result<T, E>) -> rusqlite::Result<T> {
        v.map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })
    }
    let type_s: String = r.get(4)?;
    let date_s: String = r.get(8)?;
    let created_s: String = r.get(9)?;
    let updated_s: String = r.get(10)?;
    let status_s: String = r.get(14)?;
    Ok(Entry {
        local_id: r.get(0)?,
        remote_id: r.get(1)?,
        client_id: r.get(2)?,
        amount_minor: r.get(3)?,
        entry_type: conv(4, type_s.parse())?,
        category: r.get(5)?,
        note: r.get(6)?,
        currency: r.get(7)?,
        date: conv(8, parse_date(&date_s))?,
        created_at: conv(9, parse_timestamp(&created_s))?,
        updated_at: conv(10, parse_timestamp(&updated_s))?,
        device_id: r.get(11)?,
        deleted: r.get(12)?,
        server_version: r.get(13)?,
        sync_status: conv::<SyncStatus, _>(14, status_s.parse())?,
    })
}
