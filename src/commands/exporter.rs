// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use crate::store::{EntryFilter, SqliteStore};

pub fn handle(store: &SqliteStore, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("entries", sub)) => export_entries(store, sub),
        _ => Ok(()),
    }
}

fn export_entries(store: &SqliteStore, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub
        .get_one::<String>("format")
        .context("--format is required")?
        .to_lowercase();
    let out = sub.get_one::<String>("out").context("--out is required")?;

    let mut entries = store.list_entries(&EntryFilter {
        include_deleted: sub.get_flag("all"),
        ..EntryFilter::default()
    })?;
    entries.sort_by(|a, b| a.date.cmp(&b.date).then(a.local_id.cmp(&b.local_id)));

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "date", "type", "amount", "currency", "category", "note", "client_id", "status",
            ])?;
            for e in &entries {
                wtr.write_record([
                    e.date.to_string(),
                    e.entry_type.to_string(),
                    format!("{:.2}", e.amount()),
                    e.currency.clone(),
                    e.category.clone(),
                    e.note.clone().unwrap_or_default(),
                    e.client_id.clone(),
                    e.sync_status.as_str().to_string(),
                ])?;
            }
            wtr.flush()?;
        }
        "json" => {
            let items: Vec<_> = entries
                .iter()
                .map(|e| {
                    json!({
                        "date": e.date.to_string(),
                        "type": e.entry_type.as_str(),
                        "amount": format!("{:.2}", e.amount()),
                        "currency": e.currency,
                        "category": e.category,
                        "note": e.note,
                        "client_id": e.client_id,
                        "status": e.sync_status.as_str(),
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
        _ => return Err(anyhow!("Unknown format: {} (use csv|json)", fmt)),
    }
    println!("Exported {} entries to {}", entries.len(), out);
    Ok(())
}
