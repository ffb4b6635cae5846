// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::AppContext;
use crate::gateway::GatewayHealth;
use crate::store::LocalStore;
use crate::sync::{SyncOutcome, SyncScheduler, SyncTask};
use crate::utils::{fmt_timestamp, maybe_print_json, pretty_table};

pub async fn handle(ctx: &AppContext, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("run", sub)) => run(ctx, sub).await?,
        Some(("watch", sub)) => watch(ctx, sub).await?,
        Some(("status", sub)) => status(ctx, sub).await?,
        _ => {}
    }
    Ok(())
}

async fn run(ctx: &AppContext, sub: &clap::ArgMatches) -> Result<()> {
    let force = sub.get_flag("force");
    ctx.gateway.warm();
    let outcome = ctx.coordinator().run_full_sync(force).await;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &outcome)? {
        return Ok(());
    }
    match &outcome {
        SyncOutcome::Skipped { reason } => {
            println!("Sync skipped: {:?}", reason);
        }
        SyncOutcome::Ran(report) => {
            let p = &report.push;
            let l = &report.pull;
            let rows = vec![
                vec!["push".into(), "attempted".into(), p.attempted.to_string()],
                vec!["push".into(), "synced".into(), p.pushed.to_string()],
                vec!["push".into(), "still pending".into(), p.linked.to_string()],
                vec!["push".into(), "failed".into(), p.failed.to_string()],
                vec!["pull".into(), "fetched".into(), l.fetched.to_string()],
                vec!["pull".into(), "applied".into(), l.applied.to_string()],
                vec!["pull".into(), "kept local".into(), l.kept_local.to_string()],
                vec!["pull".into(), "deleted".into(), l.deleted.to_string()],
                vec!["pull".into(), "revived".into(), l.revived.to_string()],
                vec!["pull".into(), "skipped".into(), (l.malformed + l.failed).to_string()],
            ];
            println!("{}", pretty_table(&["Phase", "Outcome", "Count"], rows));
            for e in p.errors.iter().chain(p.error.iter()).chain(l.error.iter()) {
                eprintln!("! {}", e);
            }
        }
    }
    Ok(())
}

/// Runs the foreground scheduler until Ctrl-C.
async fn watch(ctx: &AppContext, sub: &clap::ArgMatches) -> Result<()> {
    let every = sub
        .get_one::<u64>("interval")
        .map(|s| Duration::from_secs(*s))
        .unwrap_or(ctx.config.sync_interval);
    let coordinator = Arc::new(ctx.coordinator());
    let cancel = coordinator.cancel_token();
    let task: Arc<dyn SyncTask> = coordinator.clone();

    ctx.gateway.warm();
    coordinator.run_full_sync(true).await;

    let scheduler = SyncScheduler::new(task);
    scheduler.start(every);
    println!("Syncing every {}s; press Ctrl-C to stop", every.as_secs());
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    scheduler.stop();
    println!("Stopped");
    Ok(())
}

#[derive(Serialize)]
struct StatusView {
    user_id: Option<String>,
    pending: i64,
    pull_cursor: Option<String>,
    push_watermark: Option<String>,
    last_sync_at: Option<String>,
    remote: GatewayHealth,
}

async fn status(ctx: &AppContext, sub: &clap::ArgMatches) -> Result<()> {
    let user_id = ctx.user_id().await;
    let state = match &user_id {
        Some(u) => ctx.store.sync_state(u).await?,
        None => Default::default(),
    };
    let view = StatusView {
        user_id,
        pending: ctx.store.pending_count()?,
        pull_cursor: state.pull_cursor.as_ref().map(fmt_timestamp),
        push_watermark: state.push_watermark.as_ref().map(fmt_timestamp),
        last_sync_at: state.last_sync_at.as_ref().map(fmt_timestamp),
        remote: ctx.gateway.health(),
    };
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &view)? {
        return Ok(());
    }
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    let mut rows: Vec<Vec<String>> = vec![
        vec!["User".into(), opt(&view.user_id)],
        vec!["Pending entries".into(), view.pending.to_string()],
        vec!["Pull cursor".into(), opt(&view.pull_cursor)],
        vec!["Push watermark".into(), opt(&view.push_watermark)],
        vec!["Last sync".into(), opt(&view.last_sync_at)],
        vec![
            "Remote configured".into(),
            view.remote.configured.to_string(),
        ],
    ];
    rows.extend(health_rows(&view.remote));
    println!("{}", pretty_table(&["Field", "Value"], rows));
    Ok(())
}

pub(crate) fn health_rows(h: &GatewayHealth) -> Vec<Vec<String>> {
    let stamp = |t: &Option<chrono::DateTime<chrono::Utc>>| {
        t.as_ref().map(fmt_timestamp).unwrap_or_else(|| "-".into())
    };
    vec![
        vec!["Last remote success".into(), stamp(&h.last_success_at)],
        vec![
            "Last latency".into(),
            h.last_latency_ms
                .map(|ms| format!("{} ms", ms))
                .unwrap_or_else(|| "-".into()),
        ],
        vec![
            "Last remote error".into(),
            h.last_error.clone().unwrap_or_else(|| "-".into()),
        ],
        vec![
            "Consecutive failures".into(),
            h.consecutive_failures.to_string(),
        ],
        vec!["Circuit open until".into(), stamp(&h.circuit_open_until)],
    ]
}
