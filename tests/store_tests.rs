// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{d, ts, USER};
use ledgerline::db;
use ledgerline::models::{
    DailySummary, EntryPatch, EntryType, NewEntry, RemoteEntry, SummaryPeriod, SyncStatus,
};
use ledgerline::store::{EntryFilter, LocalStore, SqliteStore};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

fn new_entry(date: &str, amount: &str, t: EntryType) -> NewEntry {
    NewEntry {
        date: d(date),
        amount: Decimal::from_str(amount).unwrap(),
        entry_type: t,
        category: Some("food".into()),
        note: None,
        currency: None,
    }
}

fn remote(id: &str, client_id: Option<&str>, amount: &str, updated_at: &str) -> RemoteEntry {
    serde_json::from_value(json!({
        "id": id,
        "user_id": USER,
        "client_id": client_id,
        "type": "out",
        "amount": amount,
        "category": "Bills",
        "currency": "usd",
        "updated_at": updated_at,
        "deleted": false,
        "server_version": 4,
        "date": "2026-04-10",
    }))
    .unwrap()
}

fn day(store: &SqliteStore, date: &str) -> DailySummary {
    let conn = store.conn().unwrap();
    conn.query_row(
        "SELECT inflow_minor, outflow_minor, count FROM daily_summaries WHERE date=?1",
        [date],
        |r| {
            Ok(DailySummary {
                date: d(date),
                inflow_minor: r.get(0)?,
                outflow_minor: r.get(1)?,
                count: r.get(2)?,
            })
        },
    )
    .unwrap()
}

#[test]
fn create_normalizes_fields_and_starts_pending() {
    let store = SqliteStore::in_memory().unwrap();
    let e = store
        .create_entry(&NewEntry {
            category: Some("  GROCERIES ".into()),
            currency: Some("eur".into()),
            ..new_entry("2026-04-01", "10.005", EntryType::Outflow)
        })
        .unwrap();
    assert_eq!(e.amount_minor, 1001);
    assert_eq!(e.category, "Groceries");
    assert_eq!(e.currency, "EUR");
    assert_eq!(e.sync_status, SyncStatus::Pending);
    assert_eq!(e.server_version, 0);
    assert!(e.remote_id.is_none());
    assert_eq!(e.device_id.as_deref(), Some(store.device_id()));
    assert_eq!(e.created_at, e.updated_at);

    let unknown = store
        .create_entry(&NewEntry {
            category: Some("yachts".into()),
            ..new_entry("2026-04-01", "1", EntryType::Outflow)
        })
        .unwrap();
    assert_eq!(unknown.category, "Other");
    assert_eq!(unknown.currency, "INR");
}

#[test]
fn edits_move_updated_at_forward_and_refresh_both_days() {
    let store = SqliteStore::in_memory().unwrap();
    let e = store
        .create_entry(&new_entry("2026-04-01", "30", EntryType::Outflow))
        .unwrap();
    assert_eq!(day(&store, "2026-04-01").outflow_minor, 3000);

    let moved = store
        .update_entry(
            e.local_id,
            &EntryPatch {
                date: Some(d("2026-04-02")),
                entry_type: Some(EntryType::Inflow),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(moved.updated_at > e.updated_at);
    assert_eq!(moved.client_id, e.client_id);
    assert_eq!(day(&store, "2026-04-01").count, 0);
    assert_eq!(day(&store, "2026-04-02").inflow_minor, 3000);

    let deleted = store.soft_delete_entry(e.local_id).unwrap();
    assert!(deleted.deleted);
    assert!(deleted.updated_at > moved.updated_at);
    assert_eq!(day(&store, "2026-04-02").count, 0);
    assert!(store
        .update_entry(e.local_id, &EntryPatch::default())
        .is_err());
    assert!(store.list_entries(&EntryFilter::default()).unwrap().is_empty());
    assert_eq!(
        store
            .list_entries(&EntryFilter {
                include_deleted: true,
                ..EntryFilter::default()
            })
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn mark_synced_only_when_the_acked_stamp_still_matches() {
    let store = SqliteStore::in_memory().unwrap();
    let e = store
        .create_entry(&new_entry("2026-04-01", "5", EntryType::Outflow))
        .unwrap();
    let edited = store
        .update_entry(
            e.local_id,
            &EntryPatch {
                note: Some(Some("changed".into())),
                ..Default::default()
            },
        )
        .unwrap();

    assert!(!store
        .mark_entry_synced(e.local_id, "r1", 1, e.updated_at)
        .await
        .unwrap());
    assert_eq!(store.pending_count().unwrap(), 1);

    assert!(store
        .mark_entry_synced(e.local_id, "r1", 2, edited.updated_at)
        .await
        .unwrap());
    let synced = store.get_entry(e.local_id).unwrap().unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert_eq!(synced.remote_id.as_deref(), Some("r1"));
    assert_eq!(synced.server_version, 2);
    assert!(store.unsynced_entries().await.unwrap().is_empty());
}

#[tokio::test]
async fn remote_rows_merge_by_remote_id_then_client_id() {
    let store = SqliteStore::in_memory().unwrap();
    let mine = store
        .create_entry(&new_entry("2026-04-01", "5", EntryType::Outflow))
        .unwrap();

    store
        .upsert_local_from_remote(&remote(
            "r7",
            Some(&mine.client_id),
            "99.90",
            "2026-04-10T08:00:00.000Z",
        ))
        .await
        .unwrap();
    let merged = store.get_entry(mine.local_id).unwrap().unwrap();
    assert_eq!(merged.remote_id.as_deref(), Some("r7"));
    assert_eq!(merged.amount_minor, 9990);
    assert_eq!(merged.currency, "USD");
    assert_eq!(merged.date, d("2026-04-10"));
    assert_eq!(merged.server_version, 4);
    assert_eq!(merged.sync_status, SyncStatus::Synced);
    assert_eq!(merged.updated_at, ts("2026-04-10T08:00:00.000Z"));
    assert_eq!(day(&store, "2026-04-01").count, 0);
    assert_eq!(day(&store, "2026-04-10").outflow_minor, 9990);

    // No client id: matched by remote id, otherwise inserted.
    store
        .upsert_local_from_remote(&remote("r7", None, "10", "2026-04-10T09:00:00.000Z"))
        .await
        .unwrap();
    store
        .upsert_local_from_remote(&remote("r8", None, "1", "2026-04-10T09:00:00.000Z"))
        .await
        .unwrap();
    assert_eq!(store.list_entries(&EntryFilter::default()).unwrap().len(), 2);
    let inserted = store.local_by_remote_id("r8").await.unwrap().unwrap();
    assert_eq!(inserted.client_id, "remote:r8");
    assert!(store.local_by_client_id("remote:r8").await.unwrap().is_some());

    assert!(store.mark_local_deleted_by_remote_id("r8").await.unwrap());
    assert!(!store.mark_local_deleted_by_remote_id("missing").await.unwrap());
    assert!(store.local_by_remote_id("r8").await.unwrap().unwrap().deleted);
}

#[tokio::test]
async fn summaries_fold_into_months() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .store_summaries(&[
            DailySummary {
                date: d("2026-01-31"),
                inflow_minor: 100,
                outflow_minor: 50,
                count: 2,
            },
            DailySummary {
                date: d("2026-02-01"),
                inflow_minor: 0,
                outflow_minor: 70,
                count: 1,
            },
            DailySummary {
                date: d("2026-02-20"),
                inflow_minor: 10,
                outflow_minor: 30,
                count: 3,
            },
        ])
        .await
        .unwrap();

    let days = store
        .summaries(SummaryPeriod::Day, d("2026-02-01"), d("2026-02-28"))
        .await
        .unwrap();
    assert_eq!(days.len(), 2);

    let months = store
        .summaries(SummaryPeriod::Month, d("2026-01-01"), d("2026-02-28"))
        .await
        .unwrap();
    assert_eq!(
        months,
        vec![
            DailySummary {
                date: d("2026-01-01"),
                inflow_minor: 100,
                outflow_minor: 50,
                count: 2,
            },
            DailySummary {
                date: d("2026-02-01"),
                inflow_minor: 10,
                outflow_minor: 100,
                count: 4,
            },
        ]
    );
}

#[tokio::test]
async fn category_totals_and_maxima_cover_live_rows_in_range() {
    let store = SqliteStore::in_memory().unwrap();
    let rows = [
        ("2026-04-01", "30", EntryType::Outflow, "food"),
        ("2026-04-02", "45", EntryType::Outflow, "rent"),
        ("2026-04-02", "20", EntryType::Outflow, "food"),
        ("2026-04-03", "900", EntryType::Inflow, "salary"),
        ("2026-05-01", "999", EntryType::Outflow, "rent"),
    ];
    for (date, amount, t, cat) in rows {
        store
            .create_entry(&NewEntry {
                category: Some(cat.into()),
                ..new_entry(date, amount, t)
            })
            .unwrap();
    }
    let (start, end) = (d("2026-04-01"), d("2026-04-30"));
    assert_eq!(
        store.category_totals(start, end).await.unwrap(),
        vec![("Food".to_string(), 5000), ("Rent".to_string(), 4500)]
    );
    assert_eq!(store.max_amounts(start, end).await.unwrap(), (90000, 4500));

    let first = store.entries_page(start, end, 0, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    let rest = store
        .entries_page(start, end, first[1].local_id, 10)
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
}

#[tokio::test]
async fn sync_state_fields_are_saved_independently() {
    let store = SqliteStore::in_memory().unwrap();
    assert_eq!(store.sync_state(USER).await.unwrap(), Default::default());

    let cursor = ts("2026-04-01T10:00:00.123Z");
    store.save_pull_cursor(USER, cursor).await.unwrap();
    store
        .save_push_watermark(USER, ts("2026-04-01T09:00:00.000Z"))
        .await
        .unwrap();
    store
        .mark_sync_completed(USER, ts("2026-04-01T10:00:01.000Z"))
        .await
        .unwrap();

    let state = store.sync_state(USER).await.unwrap();
    assert_eq!(state.pull_cursor, Some(cursor));
    assert_eq!(state.push_watermark, Some(ts("2026-04-01T09:00:00.000Z")));
    assert_eq!(state.last_sync_at, Some(ts("2026-04-01T10:00:01.000Z")));
    assert!(store.sync_state("someone-else").await.unwrap().pull_cursor.is_none());
}

#[tokio::test]
async fn wipe_clears_entries_summaries_state_and_session() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .create_entry(&new_entry("2026-04-01", "5", EntryType::Outflow))
        .unwrap();
    store
        .save_pull_cursor(USER, ts("2026-04-01T10:00:00.000Z"))
        .await
        .unwrap();
    {
        let conn = store.conn().unwrap();
        db::set_setting(&conn, db::SESSION_USER_KEY, USER).unwrap();
    }
    let device = store.device_id().to_string();

    store.wipe_all().unwrap();

    assert!(store
        .list_entries(&EntryFilter {
            include_deleted: true,
            ..EntryFilter::default()
        })
        .unwrap()
        .is_empty());
    assert!(store.sync_state(USER).await.unwrap().pull_cursor.is_none());
    let conn = store.conn().unwrap();
    assert!(db::get_setting(&conn, db::SESSION_USER_KEY).unwrap().is_none());
    assert_eq!(db::device_id(&conn).unwrap(), device);
    let summaries: i64 = conn
        .query_row("SELECT COUNT(*) FROM daily_summaries", [], |r| r.get(0))
        .unwrap();
    assert_eq!(summaries, 0);
}

#[test]
fn reopening_a_file_keeps_the_device_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let first = SqliteStore::open(&path).unwrap();
    first
        .create_entry(&new_entry("2026-04-01", "5", EntryType::Outflow))
        .unwrap();
    let device = first.device_id().to_string();
    drop(first);

    let again = SqliteStore::open(&path).unwrap();
    assert_eq!(again.device_id(), device);
    assert_eq!(again.pending_count().unwrap(), 1);
}
