//! Value-level type conversion between the relational and document sides.
//!
//! Conversion is driven by the field's [`LogicalType`]. Both directions
//! share the same rules; they are exposed separately so call sites read in
//! the direction of travel.

use crate::schema::{FieldConfig, LogicalType};
use crate::values::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Error converting a single value to a declared logical type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("unable to parse datetime: {value}")]
    InvalidDateTime { value: String },

    #[error("unable to parse integer: {value}")]
    InvalidInt { value: String },

    #[error("cannot convert {kind} to {target}")]
    Unsupported {
        kind: &'static str,
        target: &'static str,
    },
}

enum Layout {
    Rfc3339,
    Zoned(&'static str),
    Naive(&'static str),
    Date(&'static str),
}

/// Accepted datetime layouts, tried in order. The first successful parse wins.
const DATETIME_LAYOUTS: [Layout; 5] = [
    Layout::Rfc3339,
    Layout::Zoned("%Y-%m-%dT%H:%M:%S%.f%:z"),
    Layout::Naive("%Y-%m-%dT%H:%M:%S%.f"),
    Layout::Naive("%Y-%m-%d %H:%M:%S%.f"),
    Layout::Date("%Y-%m-%d"),
];

/// Convert a relational value into its document representation.
pub fn to_target_type(value: &Value, field: &FieldConfig) -> Result<Value, ConversionError> {
    convert_value(value, field.field_type, field.format.as_deref())
}

/// Convert a document value into its relational representation.
pub fn to_source_type(value: &Value, field: &FieldConfig) -> Result<Value, ConversionError> {
    convert_value(value, field.field_type, field.format.as_deref())
}

/// Convert `value` to `logical_type`. Null stays null.
pub fn convert_value(
    value: &Value,
    logical_type: LogicalType,
    format: Option<&str>,
) -> Result<Value, ConversionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match logical_type {
        LogicalType::String | LogicalType::Enum => match value {
            Value::String(_) => Ok(value.clone()),
            other => Ok(Value::String(other.to_string())),
        },
        LogicalType::Int => to_int(value).map(Value::Int),
        LogicalType::DateTime => to_datetime(value, format),
        LogicalType::Passthrough => Ok(value.clone()),
    }
}

/// Numeric coercion for pagination bookkeeping. Never fails; anything that
/// does not convert counts as 0.
pub fn offset_as_int(value: &Value) -> i64 {
    to_int(value).unwrap_or(0)
}

fn to_int(value: &Value) -> Result<i64, ConversionError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Float(f) => {
            if f.is_finite() {
                Ok(f.trunc() as i64)
            } else {
                Err(ConversionError::InvalidInt {
                    value: f.to_string(),
                })
            }
        }
        Value::Decimal(d) => d.trunc().to_i64().ok_or_else(|| ConversionError::InvalidInt {
            value: d.to_string(),
        }),
        Value::DateTime(dt) => Ok(dt.timestamp_millis()),
        Value::String(s) => parse_int(s),
        Value::Bytes(b) => parse_int(&String::from_utf8_lossy(b)),
        other => Err(ConversionError::Unsupported {
            kind: other.kind(),
            target: "int",
        }),
    }
}

fn parse_int(s: &str) -> Result<i64, ConversionError> {
    let trimmed = s.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(i);
    }
    Decimal::from_str(trimmed)
        .ok()
        .and_then(|d| d.trunc().to_i64())
        .ok_or_else(|| ConversionError::InvalidInt {
            value: s.to_string(),
        })
}

fn to_datetime(value: &Value, format: Option<&str>) -> Result<Value, ConversionError> {
    match value {
        Value::DateTime(_) => Ok(value.clone()),
        Value::Int(ticks) => Utc
            .timestamp_millis_opt(*ticks)
            .single()
            .map(Value::DateTime)
            .ok_or_else(|| ConversionError::InvalidDateTime {
                value: ticks.to_string(),
            }),
        Value::String(s) => parse_datetime(s, format).map(Value::DateTime),
        Value::Bytes(b) => parse_datetime(&String::from_utf8_lossy(b), format).map(Value::DateTime),
        other => Ok(other.clone()),
    }
}

/// Parse a datetime string, trying a custom `format` first when given.
pub fn parse_datetime(s: &str, format: Option<&str>) -> Result<DateTime<Utc>, ConversionError> {
    let s = s.trim();

    if let Some(fmt) = format.filter(|f| !is_iso_alias(f)) {
        if let Some(dt) = parse_with_pattern(s, fmt) {
            return Ok(dt);
        }
    }

    DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| parse_layout(s, layout))
        .ok_or_else(|| ConversionError::InvalidDateTime {
            value: s.to_string(),
        })
}

fn is_iso_alias(format: &str) -> bool {
    format.eq_ignore_ascii_case("ISO8601") || format.eq_ignore_ascii_case("RFC3339")
}

fn parse_layout(s: &str, layout: &Layout) -> Option<DateTime<Utc>> {
    match layout {
        Layout::Rfc3339 => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Layout::Zoned(fmt) => DateTime::parse_from_str(s, fmt)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Layout::Naive(fmt) => NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| naive.and_utc()),
        Layout::Date(fmt) => NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc()),
    }
}

fn parse_with_pattern(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, fmt)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, fmt)
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, fmt)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}
