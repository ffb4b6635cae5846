// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const DEFAULT_CURRENCY: &str = "INR";
pub const FALLBACK_CATEGORY: &str = "Other";

/// Categories an entry may carry; anything else normalizes to [`FALLBACK_CATEGORY`].
pub const CATEGORIES: &[&str] = &[
    "Food",
    "Groceries",
    "Transport",
    "Shopping",
    "Bills",
    "Rent",
    "Entertainment",
    "Health",
    "Education",
    "Travel",
    "Salary",
    "Investment",
    "Gifts",
    FALLBACK_CATEGORY,
];

static AMOUNT_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.\-]").expect("static amount regex"));

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

/// Reads an amount the way it may arrive from a form or a remote row:
/// currency symbols, spaces and thousands separators are dropped, and
/// anything still unparseable counts as zero.
pub fn parse_amount_lenient(raw: &str) -> Decimal {
    let cleaned = AMOUNT_NOISE.replace_all(raw.trim(), "");
    cleaned.parse::<Decimal>().unwrap_or(Decimal::ZERO)
}

/// Lenient amount from a JSON value (number or numeric string).
pub fn amount_from_json(v: &serde_json::Value) -> Decimal {
    match v {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Decimal::from(i)
            } else {
                n.as_f64()
                    .and_then(|f| Decimal::try_from(f).ok())
                    .unwrap_or(Decimal::ZERO)
            }
        }
        serde_json::Value::String(s) => parse_amount_lenient(s),
        _ => Decimal::ZERO,
    }
}

/// The single decimal → minor-unit boundary. Rounds half away from zero to
/// two places and saturates to `±i64::MAX`, so the result always has an
/// absolute value.
pub fn to_minor_units(d: Decimal) -> i64 {
    let saturated = if d.is_sign_negative() { -i64::MAX } else { i64::MAX };
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.trunc().to_i64())
        .map_or(saturated, |minor| minor.max(-i64::MAX))
}

pub fn from_minor_units(minor: i128) -> Decimal {
    Decimal::try_from_i128_with_scale(minor, 2).unwrap_or(Decimal::MAX)
}

pub fn normalize_category(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return FALLBACK_CATEGORY.to_string();
    };
    CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(raw))
        .map(|c| c.to_string())
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
}

pub fn normalize_currency(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .filter(|s| s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|s| s.to_uppercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

/// Current time truncated to milliseconds, the precision timestamps are
/// compared at on both sides of a sync.
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

pub fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(t.timestamp_millis())
        .single()
        .unwrap_or(t)
}

pub fn fmt_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 as well as the `YYYY-MM-DD HH:MM:SS.fff+00` shape
/// Postgres renders `timestamptz` in.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(truncate_millis(t.with_timezone(&Utc)));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Ok(truncate_millis(t.with_timezone(&Utc)));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(truncate_millis(t.and_utc()));
        }
    }
    Err(anyhow::anyhow!("Invalid timestamp '{}'", s))
}

/// Reads the calendar date out of either a bare date or a timestamp.
pub fn parse_date_prefix(s: &str) -> Result<NaiveDate> {
    let head = s.trim().get(..10).unwrap_or(s);
    parse_date(head)
}

/// Every calendar day in `[start, end]`, empty when `end < start`.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

pub fn month_key(d: NaiveDate) -> String {
    format!("{:04}-{:02}", d.year(), d.month())
}

/// `YYYY-MM` keys from the month of `start` through the month of `end`.
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<String> {
    let mut out = Vec::new();
    if end < start {
        return out;
    }
    let (mut y, mut m) = (start.year(), start.month());
    while (y, m) <= (end.year(), end.month()) {
        out.push(format!("{:04}-{:02}", y, m));
        if m == 12 {
            y += 1;
            m = 1;
        } else {
            m += 1;
        }
    }
    out
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        // If v is an array, stream each element; else stream single line
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}
