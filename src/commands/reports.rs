// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::aggregate::{AggregateOptions, AggregateService};
use crate::models::AggregateResult;
use crate::utils::{maybe_print_json, parse_date, pretty_table};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

use super::AppContext;

pub async fn handle(ctx: &AppContext, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("summary", sub)) => summary(ctx, sub).await?,
        _ => {}
    }
    Ok(())
}

async fn summary(ctx: &AppContext, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let start = parse_date(sub.get_one::<String>("from").context("--from is required")?)?;
    let end = parse_date(sub.get_one::<String>("to").context("--to is required")?)?;
    if end < start {
        return Err(anyhow!("--to {} is before --from {}", end, start));
    }
    let opts = AggregateOptions {
        allow_remote: sub.get_flag("offline").then_some(false),
    };

    let service = AggregateService::new(ctx.local_store(), Arc::clone(&ctx.gateway));
    let user = ctx.user_id().await;
    if user.is_none() {
        log::warn!("not signed in; run `ledgerline login --user <id>` first");
    }
    let result = service.aggregate(user.as_deref(), start, end, opts).await;

    if !maybe_print_json(json_flag, jsonl_flag, &result)? {
        print_summary(&result);
    }
    Ok(())
}

fn print_summary(r: &AggregateResult) {
    let money = |d: &rust_decimal::Decimal| format!("{} {:.2}", r.currency, d);
    let rows = vec![
        vec!["Inflow".into(), money(&r.total_in)],
        vec!["Outflow".into(), money(&r.total_out)],
        vec!["Net".into(), money(&r.net)],
        vec!["Entries".into(), r.count.to_string()],
        vec!["Mean".into(), money(&r.mean)],
        vec!["Median".into(), money(&r.median)],
        vec!["Std dev".into(), money(&r.std_dev)],
        vec!["Largest inflow".into(), money(&r.max_in)],
        vec!["Largest outflow".into(), money(&r.max_out)],
        vec!["Avg outflow / day".into(), money(&r.avg_per_day)],
        vec!["Savings rate".into(), format!("{:.2}%", r.savings_rate)],
    ];
    println!("{} .. {}", r.start, r.end);
    println!("{}", pretty_table(&["Metric", "Value"], rows));

    if !r.categories.is_empty() {
        let rows = r
            .categories
            .iter()
            .map(|c| vec![c.category.clone(), format!("{:.2}", c.value)])
            .collect();
        println!("{}", pretty_table(&["Category", "Spent"], rows));
    }
    let spent: Vec<Vec<String>> = r
        .trend
        .iter()
        .filter(|p| !p.value.is_zero())
        .map(|p| vec![p.bucket.clone(), format!("{:.2}", p.value)])
        .collect();
    if !spent.is_empty() {
        println!("{}", pretty_table(&["Period", "Spent"], spent));
    }
}
