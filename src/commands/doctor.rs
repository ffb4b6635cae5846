// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::db;
use crate::gateway::GatewayHealth;
use crate::session::is_valid_user_id;
use crate::utils::{pretty_table, CATEGORIES};
use anyhow::Result;
use rusqlite::Connection;

use super::AppContext;

/// Pending rows older than this are reported as stuck.
const STALE_PENDING_DAYS: i64 = 7;

pub fn handle(ctx: &AppContext) -> Result<()> {
    let rows = {
        let conn = ctx.store.conn()?;
        find_issues(&conn)?
    };
    if rows.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    println!("{}", pretty_table(&["Remote", "Value"], remote_rows(&ctx.gateway.health())));
    Ok(())
}

pub fn find_issues(conn: &Connection) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();

    // 1) Amounts must be stored unsigned
    let mut stmt = conn.prepare("SELECT local_id, amount_minor FROM entries WHERE amount_minor < 0")?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let amt: i64 = r.get(1)?;
        rows.push(vec!["negative_amount".into(), format!("#{} {}", id, amt)]);
    }

    // 2) Categories outside the allow-list
    let mut stmt = conn.prepare("SELECT DISTINCT category FROM entries WHERE deleted=0")?;
    let mut cur = stmt.query([])?;
    while let Some(r) = cur.next()? {
        let c: String = r.get(0)?;
        if !CATEGORIES.contains(&c.as_str()) {
            rows.push(vec!["unknown_category".into(), c]);
        }
    }

    // 3) Pending rows that have not reached the remote in a week
    let cutoff = crate::utils::now_millis() - chrono::Duration::days(STALE_PENDING_DAYS);
    let mut stmt = conn.prepare(
        "SELECT local_id, updated_at FROM entries
         WHERE sync_status='pending' AND updated_at < ?1 ORDER BY local_id",
    )?;
    let mut cur = stmt.query([crate::utils::fmt_timestamp(&cutoff)])?;
    while let Some(r) = cur.next()? {
        let id: i64 = r.get(0)?;
        let at: String = r.get(1)?;
        rows.push(vec!["stale_pending".into(), format!("#{} since {}", id, at)]);
    }

    // 4) Session id the remote would reject
    if let Some(user) = db::get_setting(conn, db::SESSION_USER_KEY)? {
        if !is_valid_user_id(&user) {
            rows.push(vec!["local_only_session".into(), user]);
        }
    }
    Ok(rows)
}

fn remote_rows(h: &GatewayHealth) -> Vec<Vec<String>> {
    let mut rows = vec![vec!["Configured".to_string(), h.configured.to_string()]];
    rows.extend(super::sync::health_rows(h));
    rows
}
