// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use ledgerline::models::{EntryType, NewEntry};
use ledgerline::store::SqliteStore;
use ledgerline::{cli, commands::exporter};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use tempfile::tempdir;

fn seeded_store() -> SqliteStore {
    let store = SqliteStore::in_memory().unwrap();
    let rows = [
        ("2025-01-05", "12.34", EntryType::Outflow, "groceries", Some("Weekly run")),
        ("2025-01-02", "2500", EntryType::Inflow, "salary", None),
        ("2025-01-03", "8", EntryType::Outflow, "transport", None),
    ];
    for (date, amount, t, cat, note) in rows {
        store
            .create_entry(&NewEntry {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                amount: Decimal::from_str(amount).unwrap(),
                entry_type: t,
                category: Some(cat.into()),
                note: note.map(str::to_string),
                currency: Some("usd".into()),
            })
            .unwrap();
    }
    // The transport entry is deleted and only exported with --all.
    store.soft_delete_entry(3).unwrap();
    store
}

fn run_export(store: &SqliteStore, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["ledgerline", "export", "entries"];
    argv.extend_from_slice(args);
    let matches = cli::build_cli().get_matches_from(argv);
    match matches.subcommand() {
        Some(("export", export_m)) => exporter::handle(store, export_m),
        _ => panic!("no export subcommand"),
    }
}

#[test]
fn export_entries_writes_pretty_json_sorted_by_date() {
    let store = seeded_store();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.json");
    let out_str = out_path.to_string_lossy().to_string();

    run_export(&store, &["--format", "json", "--out", &out_str]).unwrap();

    let contents = std::fs::read_to_string(&out_path).unwrap();
    let mut parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    for item in parsed.as_array_mut().unwrap() {
        item.as_object_mut().unwrap().remove("client_id");
    }
    assert_eq!(
        parsed,
        json!([
            {
                "date": "2025-01-02",
                "type": "in",
                "amount": "2500.00",
                "currency": "USD",
                "category": "Salary",
                "note": null,
                "status": "pending"
            },
            {
                "date": "2025-01-05",
                "type": "out",
                "amount": "12.34",
                "currency": "USD",
                "category": "Groceries",
                "note": "Weekly run",
                "status": "pending"
            }
        ])
    );
}

#[test]
fn export_entries_csv_includes_deleted_with_all() {
    let store = seeded_store();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.csv");
    let out_str = out_path.to_string_lossy().to_string();

    run_export(&store, &["--format", "CSV", "--out", &out_str, "--all"]).unwrap();

    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["date", "type", "amount", "currency", "category", "note", "client_id", "status"]
    );
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(&rows[1][0], "2025-01-03");
    assert_eq!(&rows[1][2], "8.00");
    assert_eq!(&rows[1][4], "Transport");
}

#[test]
fn export_entries_rejects_unknown_format() {
    let store = seeded_store();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.unknown");
    let out_str = out_path.to_string_lossy().to_string();

    assert!(run_export(&store, &["--format", "xml", "--out", &out_str]).is_err());
    assert!(!out_path.exists());
}
