// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashMap};

use super::pages::PageSource;
use super::{AggregateError, Reservoir};
use crate::models::{
    AggregateResult, CategoryTotal, Entry, EntryType, FetchedRow, RemoteEntry, StreamStats,
    TrendPoint,
};
use crate::sync::CancelToken;
use crate::utils::{
    days_in_range, from_minor_units, month_key, months_in_range, DEFAULT_CURRENCY,
};

/// Ranges longer than this bucket the trend by month.
const DAILY_TREND_MAX_DAYS: i64 = 366;

#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Entries processed between yields to the runtime.
    pub batch_size: usize,
    pub reservoir_capacity: usize,
    pub cancel: Option<CancelToken>,
    /// Fixes the reservoir RNG.
    pub seed: Option<u64>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: 3_000,
            reservoir_capacity: 20_000,
            cancel: None,
            seed: None,
        }
    }
}

/// The fields aggregation reads from one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub date: NaiveDate,
    pub amount_minor: i64,
    pub entry_type: EntryType,
    pub category: String,
    pub currency: String,
}

pub trait AggregateRecord {
    /// `Ok(None)` for soft-deleted records; `Err` for records that cannot be
    /// read and count as skipped.
    fn point(&self) -> Result<Option<Point>>;
}

impl AggregateRecord for Entry {
    fn point(&self) -> Result<Option<Point>> {
        if self.deleted {
            return Ok(None);
        }
        Ok(Some(Point {
            date: self.date,
            amount_minor: self.amount_minor.saturating_abs(),
            entry_type: self.entry_type,
            category: self.category.clone(),
            currency: self.currency.clone(),
        }))
    }
}

impl AggregateRecord for RemoteEntry {
    fn point(&self) -> Result<Option<Point>> {
        if self.deleted {
            return Ok(None);
        }
        let f = self.fields()?;
        Ok(Some(Point {
            date: f.date,
            amount_minor: f.amount_minor,
            entry_type: f.entry_type,
            category: f.category,
            currency: f.currency,
        }))
    }
}

impl AggregateRecord for FetchedRow {
    fn point(&self) -> Result<Option<Point>> {
        match self {
            FetchedRow::Entry(e) => e.point(),
            FetchedRow::Unreadable { reason, .. } => {
                Err(anyhow!("unreadable remote row: {}", reason))
            }
        }
    }
}

/// Whether `[start, end]` is long enough for monthly trend buckets.
pub fn monthly_trend(start: NaiveDate, end: NaiveDate) -> bool {
    (end - start).num_days() + 1 > DAILY_TREND_MAX_DAYS
}

/// Every trend bucket of the range, in order.
pub fn trend_buckets(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    if monthly_trend(start, end) {
        months_in_range(start, end)
    } else {
        days_in_range(start, end)
            .into_iter()
            .map(|d| d.to_string())
            .collect()
    }
}

pub fn bucket_key(date: NaiveDate, monthly: bool) -> String {
    if monthly {
        month_key(date)
    } else {
        date.to_string()
    }
}

pub async fn aggregate_for_range<R: AggregateRecord>(
    entries: &[R],
    start: NaiveDate,
    end: NaiveDate,
    opts: &StreamOptions,
) -> Result<AggregateResult, AggregateError> {
    let mut acc = Accumulator::new(start, end, opts);
    acc.check_cancel()?;
    acc.feed(entries).await?;
    Ok(acc.finish())
}

pub async fn aggregate_from_pages<P: PageSource>(
    pages: &mut P,
    start: NaiveDate,
    end: NaiveDate,
    opts: &StreamOptions,
) -> Result<AggregateResult, AggregateError> {
    let mut acc = Accumulator::new(start, end, opts);
    acc.check_cancel()?;
    while let Some(page) = pages.next_page().await.map_err(AggregateError::Source)? {
        acc.feed(&page).await?;
        acc.check_cancel()?;
    }
    Ok(acc.finish())
}

struct Accumulator<'a> {
    start: NaiveDate,
    end: NaiveDate,
    monthly: bool,
    opts: &'a StreamOptions,
    total_in: i128,
    total_out: i128,
    count: u64,
    // Welford state over minor units.
    mean: f64,
    m2: f64,
    max_in: i64,
    max_out: i64,
    reservoir: Reservoir,
    categories: HashMap<String, i128>,
    trend: BTreeMap<String, i128>,
    currencies: HashMap<String, u64>,
    processed: u64,
    skipped: u64,
    batches: u32,
    in_batch: usize,
}

impl<'a> Accumulator<'a> {
    fn new(start: NaiveDate, end: NaiveDate, opts: &'a StreamOptions) -> Self {
        let trend = trend_buckets(start, end)
            .into_iter()
            .map(|b| (b, 0))
            .collect();
        Self {
            start,
            end,
            monthly: monthly_trend(start, end),
            opts,
            total_in: 0,
            total_out: 0,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            max_in: 0,
            max_out: 0,
            reservoir: Reservoir::new(opts.reservoir_capacity, opts.seed),
            categories: HashMap::new(),
            trend,
            currencies: HashMap::new(),
            processed: 0,
            skipped: 0,
            batches: 0,
            in_batch: 0,
        }
    }

    fn check_cancel(&self) -> Result<(), AggregateError> {
        match &self.opts.cancel {
            Some(c) if c.is_cancelled() => Err(AggregateError::Cancelled),
            _ => Ok(()),
        }
    }

    async fn feed<R: AggregateRecord>(&mut self, records: &[R]) -> Result<(), AggregateError> {
        let batch = self.opts.batch_size.max(1);
        for r in records {
            self.add(r);
            self.in_batch += 1;
            if self.in_batch == batch {
                self.in_batch = 0;
                self.batches += 1;
                tokio::task::yield_now().await;
                self.check_cancel()?;
            }
        }
        Ok(())
    }

    fn add<R: AggregateRecord>(&mut self, record: &R) {
        self.processed += 1;
        let p = match record.point() {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                log::debug!("skipping unreadable entry: {:#}", e);
                self.skipped += 1;
                return;
            }
        };
        if p.date < self.start || p.date > self.end {
            return;
        }

        let amount = p.amount_minor;
        self.count += 1;
        let x = amount as f64;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
        self.reservoir.push(amount);
        *self.currencies.entry(p.currency).or_insert(0) += 1;

        match p.entry_type {
            EntryType::Inflow => {
                self.total_in += amount as i128;
                self.max_in = self.max_in.max(amount);
            }
            EntryType::Outflow => {
                self.total_out += amount as i128;
                self.max_out = self.max_out.max(amount);
                *self.categories.entry(p.category).or_insert(0) += amount as i128;
                *self
                    .trend
                    .entry(bucket_key(p.date, self.monthly))
                    .or_insert(0) += amount as i128;
            }
        }
    }

    fn finish(mut self) -> AggregateResult {
        if self.in_batch > 0 {
            self.batches += 1;
        }
        let mut result = AggregateResult::empty(self.start, self.end);
        result.total_in = from_minor_units(self.total_in);
        result.total_out = from_minor_units(self.total_out);
        result.net = result.total_in - result.total_out;
        result.count = self.count;
        result.max_in = from_minor_units(self.max_in as i128);
        result.max_out = from_minor_units(self.max_out as i128);

        if self.count > 0 {
            result.mean = minor_f64_to_decimal(self.mean);
            if self.count > 1 {
                let variance = self.m2 / (self.count - 1) as f64;
                result.std_dev = minor_f64_to_decimal(variance.sqrt());
            }
            result.median = self
                .reservoir
                .median_minor()
                .map(|m| m / Decimal::ONE_HUNDRED)
                .unwrap_or(Decimal::ZERO);
        }

        result.currency = self
            .currencies
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
            .map(|(c, _)| c)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let days = days_in_range(self.start, self.end).len().max(1);
        result.avg_per_day = round2(result.total_out / Decimal::from(days as u64));
        result.savings_rate = savings_rate(result.total_in, result.total_out);

        result.trend = self
            .trend
            .into_iter()
            .map(|(bucket, v)| TrendPoint {
                bucket,
                value: from_minor_units(v),
            })
            .collect();
        result.categories = sorted_categories(self.categories);
        result.stats = StreamStats {
            processed: self.processed,
            skipped: self.skipped,
            batches: self.batches,
            median_exact: self.reservoir.is_exact(),
        };
        result
    }
}

/// `(in - out) / in * 100`, or zero without inflow. Not clamped.
pub fn savings_rate(total_in: Decimal, total_out: Decimal) -> Decimal {
    if total_in > Decimal::ZERO {
        round2((total_in - total_out) / total_in * Decimal::ONE_HUNDRED)
    } else {
        Decimal::ZERO
    }
}

/// Category totals largest first, ties by name.
pub fn sorted_categories(totals: impl IntoIterator<Item = (String, i128)>) -> Vec<CategoryTotal> {
    let mut v: Vec<(String, i128)> = totals.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v.into_iter()
        .map(|(category, minor)| CategoryTotal {
            category,
            value: from_minor_units(minor),
        })
        .collect()
}

fn minor_f64_to_decimal(minor: f64) -> Decimal {
    Decimal::from_f64(minor / 100.0)
        .map(round2)
        .unwrap_or(Decimal::ZERO)
}

fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
