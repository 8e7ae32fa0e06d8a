//! Parameter binding and result cell conversion.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use duckdb::types::{TimeUnit, ToSqlOutput, Value, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Uuid(Uuid),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    /// Bound as its JSON text.
    Json(JsonValue),
    /// Bound as JSON array text; cast in SQL (e.g. `$1::BIGINT[]`) where a
    /// list is needed.
    List(Vec<Param>),
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Decimal> for Param {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<Uuid> for Param {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<NaiveDate> for Param {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Param {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl Param {
    /// JSON form of the value, used for list and JSON binding.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Bytes(bytes) => JsonValue::String(hex(bytes)),
            Self::Decimal(d) => JsonValue::String(d.to_string()),
            Self::Uuid(u) => JsonValue::String(u.to_string()),
            Self::Date(d) => JsonValue::String(d.to_string()),
            Self::Timestamp(ts) => JsonValue::String(ts.to_string()),
            Self::Json(j) => j.clone(),
            Self::List(items) => JsonValue::Array(items.iter().map(Param::to_json).collect()),
        }
    }

    /// The engine value this parameter binds as.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Boolean(*b),
            Self::Int(i) => Value::BigInt(*i),
            Self::Float(f) => Value::Double(*f),
            Self::String(s) => Value::Text(s.clone()),
            Self::Bytes(bytes) => Value::Blob(bytes.clone()),
            Self::Decimal(d) => Value::Decimal(*d),
            Self::Uuid(u) => Value::Text(u.to_string()),
            Self::Date(d) => Value::Date32(d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
            Self::Timestamp(ts) => {
                Value::Timestamp(TimeUnit::Microsecond, ts.and_utc().timestamp_micros())
            }
            Self::Json(j) => Value::Text(j.to_string()),
            Self::List(_) => Value::Text(self.to_json().to_string()),
        }
    }
}

/// Binds a [`Param`] through `duckdb::ToSql`.
pub struct DuckDbParam<'a>(pub &'a Param);

impl duckdb::ToSql for DuckDbParam<'_> {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.0.to_value()))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn float_json(f: f64) -> JsonValue {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn date_json(days: i32) -> JsonValue {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
        .map(|d| JsonValue::String(d.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn time_json(unit: TimeUnit, value: i64) -> JsonValue {
    let micros = to_micros(unit, value);
    let secs = (micros / 1_000_000) as u32;
    let nanos = ((micros % 1_000_000) * 1_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        .map(|t| JsonValue::String(t.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn timestamp_json(unit: TimeUnit, value: i64) -> JsonValue {
    DateTime::from_timestamp_micros(to_micros(unit, value))
        .map(|ts| JsonValue::String(ts.naive_utc().to_string()))
        .unwrap_or(JsonValue::Null)
}

fn interval_json(months: i32, days: i32, nanos: i64) -> JsonValue {
    serde_json::json!({ "months": months, "days": days, "nanos": nanos })
}

/// Convert an owned engine value into JSON.
///
/// Text stays text, including `JSON` columns, which DuckDB stores as text.
/// Values JSON numbers cannot hold exactly (128-bit integers, decimals) are
/// returned as strings.
pub fn value_to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::Number(i.into()),
        Value::SmallInt(i) => JsonValue::Number(i.into()),
        Value::Int(i) => JsonValue::Number(i.into()),
        Value::BigInt(i) => JsonValue::Number(i.into()),
        Value::HugeInt(i) => JsonValue::String(i.to_string()),
        Value::UTinyInt(i) => JsonValue::Number(i.into()),
        Value::USmallInt(i) => JsonValue::Number(i.into()),
        Value::UInt(i) => JsonValue::Number(i.into()),
        Value::UBigInt(i) => JsonValue::Number(i.into()),
        Value::Float(f) => float_json(f as f64),
        Value::Double(f) => float_json(f),
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(bytes) => JsonValue::String(hex(&bytes)),
        Value::Date32(days) => date_json(days),
        Value::Time64(unit, v) => time_json(unit, v),
        Value::Timestamp(unit, v) => timestamp_json(unit, v),
        Value::Interval {
            months,
            days,
            nanos,
        } => interval_json(months, days, nanos),
        Value::List(items) | Value::Array(items) => {
            JsonValue::Array(items.into_iter().map(value_to_json).collect())
        }
        Value::Enum(e) => JsonValue::String(e),
        Value::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v.clone())))
                .collect(),
        ),
        Value::Map(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| {
                    let key = match value_to_json(k.clone()) {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, value_to_json(v.clone()))
                })
                .collect(),
        ),
        Value::Union(inner) => value_to_json(*inner),
    }
}

/// Convert a borrowed result cell into JSON.
pub fn value_ref_to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Boolean(b) => JsonValue::Bool(b),
        ValueRef::TinyInt(i) => JsonValue::Number(i.into()),
        ValueRef::SmallInt(i) => JsonValue::Number(i.into()),
        ValueRef::Int(i) => JsonValue::Number(i.into()),
        ValueRef::BigInt(i) => JsonValue::Number(i.into()),
        ValueRef::HugeInt(i) => JsonValue::String(i.to_string()),
        ValueRef::UTinyInt(i) => JsonValue::Number(i.into()),
        ValueRef::USmallInt(i) => JsonValue::Number(i.into()),
        ValueRef::UInt(i) => JsonValue::Number(i.into()),
        ValueRef::UBigInt(i) => JsonValue::Number(i.into()),
        ValueRef::Float(f) => float_json(f as f64),
        ValueRef::Double(f) => float_json(f),
        ValueRef::Decimal(d) => JsonValue::String(d.to_string()),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => JsonValue::String(hex(bytes)),
        ValueRef::Date32(days) => date_json(days),
        ValueRef::Time64(unit, v) => time_json(unit, v),
        ValueRef::Timestamp(unit, v) => timestamp_json(unit, v),
        ValueRef::Interval {
            months,
            days,
            nanos,
        } => interval_json(months, days, nanos),
        // Nested types are read through their owned form.
        ValueRef::List(..)
        | ValueRef::Enum(..)
        | ValueRef::Struct(..)
        | ValueRef::Array(..)
        | ValueRef::Map(..)
        | ValueRef::Union(..) => value_to_json(value.to_owned()),
    }
}
