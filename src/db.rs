// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Ledgerline", "ledgerline"));

pub const DEVICE_ID_KEY: &str = "device_id";
pub const SESSION_USER_KEY: &str = "session_user_id";
/// The account local entries belong to. Survives logout; cleared by wipe.
pub const LEDGER_OWNER_KEY: &str = "ledger_owner_id";

pub fn db_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(p) = override_path {
        return Ok(PathBuf::from(p));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("ledgerline.sqlite"))
}

pub fn open_or_init(path: &Path) -> Result<Connection> {
    let mut conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS entries(
        local_id INTEGER PRIMARY KEY AUTOINCREMENT,
        remote_id TEXT UNIQUE,
        client_id TEXT NOT NULL UNIQUE,
        amount_minor INTEGER NOT NULL CHECK(amount_minor >= 0),
        type TEXT NOT NULL CHECK(type IN ('in','out')),
        category TEXT NOT NULL,
        note TEXT,
        currency TEXT NOT NULL DEFAULT 'INR',
        date TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        device_id TEXT,
        deleted INTEGER NOT NULL DEFAULT 0,
        server_version INTEGER NOT NULL DEFAULT 0,
        sync_status TEXT NOT NULL DEFAULT 'pending' CHECK(sync_status IN ('pending','synced'))
    );
    CREATE INDEX IF NOT EXISTS idx_entries_date ON entries(date);
    CREATE INDEX IF NOT EXISTS idx_entries_sync ON entries(sync_status);

    -- one row per user: pull cursor and push watermark
    CREATE TABLE IF NOT EXISTS sync_state(
        user_id TEXT PRIMARY KEY,
        pull_cursor TEXT,
        push_watermark TEXT,
        last_sync_at TEXT
    );

    CREATE TABLE IF NOT EXISTS daily_summaries(
        date TEXT PRIMARY KEY,
        inflow_minor INTEGER NOT NULL DEFAULT 0,
        outflow_minor INTEGER NOT NULL DEFAULT 0,
        count INTEGER NOT NULL DEFAULT 0
    );
    "#,
    )?;
    Ok(())
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key=?1", params![key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(v)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn clear_setting(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM settings WHERE key=?1", params![key])?;
    Ok(())
}

/// The identity this install writes entries under, created on first use.
pub fn device_id(conn: &Connection) -> Result<String> {
    if let Some(id) = get_setting(conn, DEVICE_ID_KEY)? {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    set_setting(conn, DEVICE_ID_KEY, &id)?;
    Ok(id)
}
