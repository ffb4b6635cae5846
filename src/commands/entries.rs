// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{Entry, EntryPatch, EntryType, NewEntry};
use crate::store::{EntryFilter, SqliteStore};
use crate::utils::{maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::{Context, Result};
use serde::Serialize;

pub fn handle(store: &SqliteStore, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(store, sub)?,
        Some(("edit", sub)) => edit(store, sub)?,
        Some(("rm", sub)) => remove(store, sub)?,
        Some(("list", sub)) => list(store, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(store: &SqliteStore, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").context("--date is required")?)?;
    let amount = parse_decimal(sub.get_one::<String>("amount").context("--amount is required")?)?;
    let entry_type: EntryType = sub
        .get_one::<String>("type")
        .context("--type is required")?
        .parse()?;
    let entry = store.create_entry(&NewEntry {
        date,
        amount,
        entry_type,
        category: sub.get_one::<String>("category").cloned(),
        note: sub.get_one::<String>("note").cloned(),
        currency: sub.get_one::<String>("currency").cloned(),
    })?;
    println!(
        "Recorded #{} {} {} {} on {} ({})",
        entry.local_id,
        entry.entry_type,
        entry.amount(),
        entry.currency,
        entry.date,
        entry.category
    );
    Ok(())
}

fn edit(store: &SqliteStore, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").context("entry id is required")?;
    let patch = EntryPatch {
        date: sub
            .get_one::<String>("date")
            .map(|s| parse_date(s))
            .transpose()?,
        amount: sub
            .get_one::<String>("amount")
            .map(|s| parse_decimal(s))
            .transpose()?,
        entry_type: sub
            .get_one::<String>("type")
            .map(|s| s.parse())
            .transpose()?,
        category: sub.get_one::<String>("category").cloned(),
        note: if sub.get_flag("clear-note") {
            Some(None)
        } else {
            sub.get_one::<String>("note").map(|n| Some(n.clone()))
        },
        currency: sub.get_one::<String>("currency").cloned(),
    };
    let entry = store.update_entry(id, &patch)?;
    println!("Updated #{} (pending sync)", entry.local_id);
    Ok(())
}

fn remove(store: &SqliteStore, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").context("entry id is required")?;
    store.soft_delete_entry(id)?;
    println!("Deleted #{} (pending sync)", id);
    Ok(())
}

fn list(store: &SqliteStore, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let data = query_rows(store, sub)?;
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.entry_type.clone(),
                    r.amount.clone(),
                    r.currency.clone(),
                    r.category.clone(),
                    r.note.clone(),
                    r.status.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &["ID", "Date", "Type", "Amount", "CCY", "Category", "Note", "Sync"],
                rows,
            )
        );
    }
    Ok(())
}

#[derive(Serialize)]
pub struct EntryRow {
    pub id: i64,
    pub date: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub amount: String,
    pub currency: String,
    pub category: String,
    pub note: String,
    pub status: String,
}

impl From<&Entry> for EntryRow {
    fn from(e: &Entry) -> Self {
        let status = if e.deleted {
            format!("{} (deleted)", e.sync_status.as_str())
        } else {
            e.sync_status.as_str().to_string()
        };
        Self {
            id: e.local_id,
            date: e.date.to_string(),
            entry_type: e.entry_type.to_string(),
            amount: format!("{:.2}", e.amount()),
            currency: e.currency.clone(),
            category: e.category.clone(),
            note: e.note.clone().unwrap_or_default(),
            status,
        }
    }
}

pub fn query_rows(store: &SqliteStore, sub: &clap::ArgMatches) -> Result<Vec<EntryRow>> {
    let filter = EntryFilter {
        from: sub
            .get_one::<String>("from")
            .map(|s| parse_date(s))
            .transpose()?,
        to: sub
            .get_one::<String>("to")
            .map(|s| parse_date(s))
            .transpose()?,
        pending_only: sub.get_flag("pending"),
        include_deleted: sub.get_flag("all"),
        limit: sub.get_one::<usize>("limit").copied(),
    };
    let entries = store.list_entries(&filter)?;
    Ok(entries.iter().map(EntryRow::from).collect())
}
