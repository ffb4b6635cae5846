// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::{
    amount_from_json, from_minor_units, normalize_category, normalize_currency,
    parse_date_prefix, parse_timestamp, to_minor_units,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    #[serde(rename = "in", alias = "inflow", alias = "income")]
    Inflow,
    #[serde(rename = "out", alias = "outflow", alias = "expense")]
    Outflow,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Inflow => "in",
            EntryType::Outflow => "out",
        }
    }
}

impl FromStr for EntryType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "inflow" | "income" => Ok(EntryType::Inflow),
            "out" | "outflow" | "expense" => Ok(EntryType::Outflow),
            other => Err(anyhow!("Unknown entry type '{}' (use in|out)", other)),
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "synced" => Ok(SyncStatus::Synced),
            other => Err(anyhow!("Unknown sync status '{}'", other)),
        }
    }
}

/// A financial entry as held by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub local_id: i64,
    pub remote_id: Option<String>,
    pub client_id: String,
    /// Non-negative; the sign lives in `entry_type`.
    pub amount_minor: i64,
    pub entry_type: EntryType,
    pub category: String,
    pub note: Option<String>,
    pub currency: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub device_id: Option<String>,
    pub deleted: bool,
    pub server_version: i64,
    pub sync_status: SyncStatus,
}

impl Entry {
    pub fn amount(&self) -> Decimal {
        from_minor_units(self.amount_minor as i128)
    }

    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }
}

/// Fields for a locally created entry.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub entry_type: EntryType,
    pub category: Option<String>,
    pub note: Option<String>,
    pub currency: Option<String>,
}

/// A local edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub entry_type: Option<EntryType>,
    pub category: Option<String>,
    pub note: Option<Option<String>>,
    pub currency: Option<String>,
}

/// A row of the remote `entries` table.
///
/// Remote numerics and bigints may arrive either as JSON numbers or strings,
/// so those columns are read leniently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    #[serde(deserialize_with = "de_string_or_number")]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub amount: serde_json::Value,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "de_timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    pub server_version: i64,
    pub date: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

/// A remote row validated into local field types.
#[derive(Debug, Clone)]
pub struct RemoteFields {
    pub amount_minor: i64,
    pub entry_type: EntryType,
    pub category: String,
    pub currency: String,
    pub date: NaiveDate,
}

impl RemoteEntry {
    pub fn fields(&self) -> Result<RemoteFields> {
        let entry_type: EntryType = self.entry_type.parse()?;
        let amount_minor = to_minor_units(amount_from_json(&self.amount)).saturating_abs();
        Ok(RemoteFields {
            amount_minor,
            entry_type,
            category: normalize_category(self.category.as_deref()),
            currency: normalize_currency(self.currency.as_deref()),
            date: parse_date_prefix(&self.date)?,
        })
    }
}

/// A remote row decoded apart from its page, so one unreadable row does not
/// sink the rows around it.
#[derive(Debug, Clone)]
pub enum FetchedRow {
    Entry(RemoteEntry),
    /// Did not decode. The keyset columns are kept when they could be read.
    Unreadable {
        id: Option<String>,
        updated_at: Option<DateTime<Utc>>,
        reason: String,
    },
}

impl FetchedRow {
    pub fn decode(row: serde_json::Map<String, serde_json::Value>) -> Self {
        let id = match row.get("id") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let updated_at = row
            .get("updated_at")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| parse_timestamp(s).ok());
        match serde_json::from_value::<RemoteEntry>(serde_json::Value::Object(row)) {
            Ok(entry) => FetchedRow::Entry(entry),
            Err(e) => FetchedRow::Unreadable {
                id,
                updated_at,
                reason: e.to_string(),
            },
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            FetchedRow::Entry(e) => Some(e.id.as_str()),
            FetchedRow::Unreadable { id, .. } => id.as_deref(),
        }
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            FetchedRow::Entry(e) => Some(e.updated_at),
            FetchedRow::Unreadable { updated_at, .. } => *updated_at,
        }
    }
}

/// What the remote returns after accepting a write.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteAck {
    #[serde(deserialize_with = "de_string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "de_i64_lenient")]
    pub server_version: i64,
    #[serde(deserialize_with = "de_timestamp")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPeriod {
    Day,
    Month,
}

/// Precomputed totals for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub inflow_minor: i64,
    pub outflow_minor: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub pull_cursor: Option<DateTime<Utc>>,
    pub push_watermark: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    pub processed: u64,
    pub skipped: u64,
    pub batches: u32,
    pub median_exact: bool,
}

/// Summary of a date range. Produced fresh for every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub total_in: Decimal,
    pub total_out: Decimal,
    pub net: Decimal,
    pub count: u64,
    pub mean: Decimal,
    pub median: Decimal,
    pub std_dev: Decimal,
    pub max_in: Decimal,
    pub max_out: Decimal,
    pub currency: String,
    pub avg_per_day: Decimal,
    pub savings_rate: Decimal,
    pub trend: Vec<TrendPoint>,
    pub categories: Vec<CategoryTotal>,
    pub stats: StreamStats,
}

impl AggregateResult {
    /// All-zero result for a range, with a zero-filled trend bucketed the
    /// way the range calls for.
    pub fn empty(start: NaiveDate, end: NaiveDate) -> Self {
        let trend = crate::aggregate::stream::trend_buckets(start, end)
            .into_iter()
            .map(|bucket| TrendPoint {
                bucket,
                value: Decimal::ZERO,
            })
            .collect();
        Self {
            start,
            end,
            total_in: Decimal::ZERO,
            total_out: Decimal::ZERO,
            net: Decimal::ZERO,
            count: 0,
            mean: Decimal::ZERO,
            median: Decimal::ZERO,
            std_dev: Decimal::ZERO,
            max_in: Decimal::ZERO,
            max_out: Decimal::ZERO,
            currency: crate::utils::DEFAULT_CURRENCY.to_string(),
            avg_per_day: Decimal::ZERO,
            savings_rate: Decimal::ZERO,
            trend,
            categories: Vec::new(),
            stats: StreamStats::default(),
        }
    }
}

fn de_string_or_number<'de, D>(d: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn de_i64_lenient<'de, D>(d: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("not an integer: {}", n))),
        serde_json::Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        serde_json::Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected integer, got {}",
            other
        ))),
    }
}

fn de_timestamp<'de, D>(d: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    parse_timestamp(&s).map_err(serde::de::Error::custom)
}

fn de_opt_timestamp<'de, D>(d: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(d)? {
        Some(s) => parse_timestamp(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_row_reads_string_numerics() {
        let row: RemoteEntry = serde_json::from_value(json!({
            "id": 42,
            "user_id": "u",
            "client_id": "c-1",
            "type": "out",
            "amount": "1,250.75",
            "category": "food",
            "note": null,
            "currency": null,
            "created_at": "2026-01-01 08:00:00+00",
            "updated_at": "2026-01-01T08:00:00.250Z",
            "deleted": false,
            "server_version": "7",
            "date": "2026-01-01T00:00:00.000Z"
        }))
        .unwrap();
        assert_eq!(row.id, "42");
        assert_eq!(row.server_version, 7);
        let f = row.fields().unwrap();
        assert_eq!(f.amount_minor, 125075);
        assert_eq!(f.entry_type, EntryType::Outflow);
        assert_eq!(f.category, "Food");
        assert_eq!(f.currency, "INR");
        assert_eq!(f.date, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!("sideways".parse::<EntryType>().is_err());
        assert_eq!("Income".parse::<EntryType>().unwrap(), EntryType::Inflow);
    }
}
