//! Polars `AnyValue` conversion helpers used when lifting DataFrame rows
//! into typed records.

use chrono::NaiveDateTime;
use polars::prelude::*;

/// Converts an AnyValue to f64, returning None for non-numeric or null values.
pub fn any_to_f64(value: &AnyValue<'_>) -> Option<f64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(f64::from(*v)),
        AnyValue::Int16(v) => Some(f64::from(*v)),
        AnyValue::Int32(v) => Some(f64::from(*v)),
        AnyValue::Int64(v) => Some(*v as f64),
        AnyValue::UInt8(v) => Some(f64::from(*v)),
        AnyValue::UInt16(v) => Some(f64::from(*v)),
        AnyValue::UInt32(v) => Some(f64::from(*v)),
        AnyValue::UInt64(v) => Some(*v as f64),
        AnyValue::Float32(v) => Some(f64::from(*v)),
        AnyValue::Float64(v) => Some(*v),
        _ => None,
    }
}

/// Converts an AnyValue to i64, returning None for non-integer or null values.
pub fn any_to_i64(value: &AnyValue<'_>) -> Option<i64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(i64::from(*v)),
        AnyValue::Int16(v) => Some(i64::from(*v)),
        AnyValue::Int32(v) => Some(i64::from(*v)),
        AnyValue::Int64(v) => Some(*v),
        AnyValue::UInt8(v) => Some(i64::from(*v)),
        AnyValue::UInt16(v) => Some(i64::from(*v)),
        AnyValue::UInt32(v) => Some(i64::from(*v)),
        AnyValue::UInt64(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

/// Converts an AnyValue to a boolean; null and non-boolean values are None.
pub fn any_to_bool(value: &AnyValue<'_>) -> Option<bool> {
    match value {
        AnyValue::Boolean(v) => Some(*v),
        _ => None,
    }
}

/// Converts an AnyValue to String, returning None for null or blank values.
pub fn any_to_string_non_empty(value: &AnyValue<'_>) -> Option<String> {
    let s = match value {
        AnyValue::Null => return None,
        AnyValue::String(s) => (*s).to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => other.to_string(),
    };
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Converts a datetime AnyValue to a naive timestamp, honoring the time unit.
pub fn any_to_naive_datetime(value: &AnyValue<'_>) -> Option<NaiveDateTime> {
    let (ts, unit) = match value {
        AnyValue::Datetime(v, unit, _) => (*v, *unit),
        AnyValue::DatetimeOwned(v, unit, _) => (*v, *unit),
        _ => return None,
    };
    let dt = match unit {
        TimeUnit::Milliseconds => chrono::DateTime::from_timestamp_millis(ts),
        TimeUnit::Microseconds => chrono::DateTime::from_timestamp_micros(ts),
        TimeUnit::Nanoseconds => Some(chrono::DateTime::from_timestamp_nanos(ts)),
    }?;
    Some(dt.naive_utc())
}
