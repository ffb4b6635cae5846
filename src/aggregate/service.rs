// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::pages::{LocalPages, RemotePages};
use super::stream::{
    aggregate_from_pages, bucket_key, monthly_trend, savings_rate, sorted_categories,
    trend_buckets, StreamOptions,
};
use super::AggregateError;
use crate::gateway::{CallOptions, RemoteGateway, Row};
use crate::models::{AggregateResult, CategoryTotal, DailySummary, SummaryPeriod, TrendPoint};
use crate::session::is_valid_user_id;
use crate::store::LocalStore;
use crate::utils::{
    amount_from_json, days_in_range, from_minor_units, parse_date_prefix, to_minor_units,
};

const BACKFILL_SQL: &str = "SELECT date::text AS date,
       COALESCE(SUM(CASE WHEN type = 'in' THEN amount END), 0)::text AS inflow,
       COALESCE(SUM(CASE WHEN type = 'out' THEN amount END), 0)::text AS outflow,
       COUNT(*) AS count
FROM entries
WHERE user_id = $1 AND deleted = false AND date = ANY($2::date[])
GROUP BY date";

const CATEGORY_SQL: &str = "SELECT category, SUM(amount)::text AS total
FROM entries
WHERE user_id = $1 AND deleted = false AND type = 'out'
  AND date >= $2::date AND date <= $3::date
GROUP BY category";

const MAXIMA_SQL: &str = "SELECT COALESCE(MAX(CASE WHEN type = 'in' THEN amount END), 0)::text AS max_in,
       COALESCE(MAX(CASE WHEN type = 'out' THEN amount END), 0)::text AS max_out
FROM entries
WHERE user_id = $1 AND deleted = false AND date >= $2::date AND date <= $3::date";

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateOptions {
    /// `Some(false)` keeps the query fully local: no remote call and no
    /// reachability probe.
    pub allow_remote: Option<bool>,
}

pub struct AggregateService {
    store: Arc<dyn LocalStore>,
    gateway: Arc<RemoteGateway>,
    stream: StreamOptions,
}

impl AggregateService {
    pub fn new(store: Arc<dyn LocalStore>, gateway: Arc<RemoteGateway>) -> Self {
        Self {
            store,
            gateway,
            stream: StreamOptions::default(),
        }
    }

    pub fn with_stream_options(mut self, stream: StreamOptions) -> Self {
        self.stream = stream;
        self
    }

    /// Summary of `[start, end]`. Never fails: without a user, or on any
    /// error, the result is all zeros shaped for the range.
    pub async fn aggregate(
        &self,
        user_id: Option<&str>,
        start: NaiveDate,
        end: NaiveDate,
        opts: AggregateOptions,
    ) -> AggregateResult {
        let Some(user_id) = user_id.map(str::trim).filter(|u| !u.is_empty()) else {
            return AggregateResult::empty(start, end);
        };
        match self.try_aggregate(user_id, start, end, opts).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("aggregation for {}..{} failed: {:#}", start, end, e);
                AggregateResult::empty(start, end)
            }
        }
    }

    async fn try_aggregate(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        opts: AggregateOptions,
    ) -> Result<AggregateResult> {
        let remote = opts.allow_remote != Some(false)
            && self.gateway.is_configured()
            && is_valid_user_id(user_id);

        let mut by_day: BTreeMap<NaiveDate, DailySummary> = self
            .store
            .summaries(SummaryPeriod::Day, start, end)
            .await?
            .into_iter()
            .map(|s| (s.date, s))
            .collect();

        let missing: Vec<NaiveDate> = days_in_range(start, end)
            .into_iter()
            .filter(|d| !by_day.contains_key(d))
            .collect();
        if remote && !missing.is_empty() {
            match self.backfill(user_id, &missing).await {
                Ok(rows) => {
                    log::debug!("backfilled {} day(s) of summaries", rows.len());
                    for s in rows {
                        by_day.insert(s.date, s);
                    }
                }
                Err(e) => log::warn!("summary backfill failed: {:#}", e),
            }
        }

        if !by_day.is_empty() {
            return Ok(self
                .from_summaries(user_id, start, end, &by_day, remote)
                .await);
        }

        if remote {
            let mut pages = RemotePages::new(Arc::clone(&self.gateway), user_id, start, end);
            match aggregate_from_pages(&mut pages, start, end, &self.stream).await {
                Ok(r) => return Ok(r),
                Err(AggregateError::Cancelled) => return Err(anyhow!(AggregateError::Cancelled)),
                Err(e) => log::warn!("remote streaming failed, using local entries: {}", e),
            }
        }
        let mut pages = LocalPages::new(Arc::clone(&self.store), start, end);
        aggregate_from_pages(&mut pages, start, end, &self.stream)
            .await
            .map_err(|e| anyhow!(e))
    }

    /// Fetches summaries for `days` from the remote and caches them locally,
    /// including zero rows for days the remote has nothing for.
    async fn backfill(&self, user_id: &str, days: &[NaiveDate]) -> Result<Vec<DailySummary>> {
        let dates: Vec<String> = days.iter().map(|d| d.to_string()).collect();
        let rows = self
            .gateway
            .execute(BACKFILL_SQL, &[json!(user_id), json!(dates)], CallOptions::default())
            .await?;
        let mut found: BTreeMap<NaiveDate, DailySummary> = BTreeMap::new();
        for row in &rows {
            let s = summary_from_row(row)?;
            found.insert(s.date, s);
        }
        for d in days {
            found.entry(*d).or_insert(DailySummary {
                date: *d,
                inflow_minor: 0,
                outflow_minor: 0,
                count: 0,
            });
        }
        let out: Vec<DailySummary> = found.into_values().collect();
        self.store
            .store_summaries(&out)
            .await
            .context("caching backfilled summaries")?;
        Ok(out)
    }

    async fn from_summaries(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        by_day: &BTreeMap<NaiveDate, DailySummary>,
        remote: bool,
    ) -> AggregateResult {
        let mut result = AggregateResult::empty(start, end);
        let (mut total_in, mut total_out, mut count) = (0i128, 0i128, 0i64);
        let monthly = monthly_trend(start, end);
        let mut trend: BTreeMap<String, i128> =
            trend_buckets(start, end).into_iter().map(|b| (b, 0)).collect();
        for s in by_day.values() {
            total_in += s.inflow_minor as i128;
            total_out += s.outflow_minor as i128;
            count += s.count;
            *trend.entry(bucket_key(s.date, monthly)).or_insert(0) += s.outflow_minor as i128;
        }

        result.total_in = from_minor_units(total_in);
        result.total_out = from_minor_units(total_out);
        result.net = result.total_in - result.total_out;
        result.count = count.max(0) as u64;
        if count > 0 {
            result.mean = from_minor_units(total_in + total_out) / Decimal::from(count);
            result.mean = result.mean.round_dp(2);
        }
        result.trend = trend
            .into_iter()
            .map(|(bucket, v)| TrendPoint {
                bucket,
                value: from_minor_units(v),
            })
            .collect();

        let days = days_in_range(start, end).len().max(1);
        result.avg_per_day = (result.total_out / Decimal::from(days as u64)).round_dp(2);
        result.savings_rate = savings_rate(result.total_in, result.total_out).max(Decimal::ZERO);

        result.categories = self.categories(user_id, start, end, remote).await;
        let (max_in, max_out) = self.maxima(user_id, start, end, remote).await;
        result.max_in = from_minor_units(max_in as i128);
        result.max_out = from_minor_units(max_out as i128);
        result
    }

    async fn categories(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        remote: bool,
    ) -> Vec<CategoryTotal> {
        if remote {
            let params = range_params(user_id, start, end);
            match self
                .gateway
                .execute(CATEGORY_SQL, &params, CallOptions::default())
                .await
            {
                Ok(rows) => {
                    return sorted_categories(rows.iter().map(|r| {
                        let name = r
                            .get("category")
                            .and_then(Value::as_str)
                            .map(|s| crate::utils::normalize_category(Some(s)))
                            .unwrap_or_else(|| crate::utils::FALLBACK_CATEGORY.to_string());
                        (name, minor_from(r.get("total")) as i128)
                    }));
                }
                Err(e) => log::warn!("remote category totals failed, using local: {}", e),
            }
        }
        match self.store.category_totals(start, end).await {
            Ok(rows) => sorted_categories(rows.into_iter().map(|(c, v)| (c, v as i128))),
            Err(e) => {
                log::warn!("local category totals failed: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn maxima(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        remote: bool,
    ) -> (i64, i64) {
        if remote {
            let params = range_params(user_id, start, end);
            match self
                .gateway
                .execute(MAXIMA_SQL, &params, CallOptions::default())
                .await
            {
                Ok(rows) => {
                    if let Some(r) = rows.first() {
                        return (minor_from(r.get("max_in")), minor_from(r.get("max_out")));
                    }
                }
                Err(e) => log::warn!("remote maxima failed, using local: {}", e),
            }
        }
        self.store.max_amounts(start, end).await.unwrap_or_else(|e| {
            log::warn!("local maxima failed: {:#}", e);
            (0, 0)
        })
    }
}

fn range_params(user_id: &str, start: NaiveDate, end: NaiveDate) -> Vec<Value> {
    vec![
        json!(user_id),
        json!(start.to_string()),
        json!(end.to_string()),
    ]
}

fn minor_from(v: Option<&Value>) -> i64 {
    v.map(|v| to_minor_units(amount_from_json(v)).saturating_abs())
        .unwrap_or(0)
}

fn summary_from_row(row: &Row) -> Result<DailySummary> {
    let date = row
        .get("date")
        .and_then(Value::as_str)
        .context("summary row without date")?;
    let count = match row.get("count") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    Ok(DailySummary {
        date: parse_date_prefix(date)?,
        inflow_minor: minor_from(row.get("inflow")),
        outflow_minor: minor_from(row.get("outflow")),
        count,
    })
}
