//! Conversion between PostgreSQL wire values and [`sync_core::Value`].

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::str::FromStr;
use sync_core::{Record, Value};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Row;

/// Boxed statement parameter.
pub type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Convert a full row into a [`Record`] keyed by column name.
pub fn row_to_record(row: &Row) -> Result<Record> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        record.insert(column.name().to_string(), convert_postgres_value(row, i)?);
    }
    Ok(record)
}

/// Convert one column of a row.
///
/// BYTEA columns become strings (lossy UTF-8). UUID and TIME become their
/// text form. DATE becomes midnight UTC.
pub fn convert_postgres_value(row: &Row, index: usize) -> Result<Value> {
    let column = &row.columns()[index];
    let pg_type = column.type_();

    match *pg_type {
        Type::BOOL => Ok(row
            .try_get::<_, Option<bool>>(index)?
            .map(Value::Bool)
            .unwrap_or(Value::Null)),
        Type::INT2 => Ok(row
            .try_get::<_, Option<i16>>(index)?
            .map(|i| Value::Int(i as i64))
            .unwrap_or(Value::Null)),
        Type::INT4 => Ok(row
            .try_get::<_, Option<i32>>(index)?
            .map(|i| Value::Int(i as i64))
            .unwrap_or(Value::Null)),
        Type::INT8 => Ok(row
            .try_get::<_, Option<i64>>(index)?
            .map(Value::Int)
            .unwrap_or(Value::Null)),
        Type::FLOAT4 => Ok(row
            .try_get::<_, Option<f32>>(index)?
            .map(|f| Value::Float(f as f64))
            .unwrap_or(Value::Null)),
        Type::FLOAT8 => Ok(row
            .try_get::<_, Option<f64>>(index)?
            .map(Value::Float)
            .unwrap_or(Value::Null)),
        Type::NUMERIC => match row.try_get::<_, Option<Decimal>>(index) {
            Ok(Some(decimal)) => Ok(Value::Decimal(decimal)),
            Ok(None) => Ok(Value::Null),
            Err(e) => {
                tracing::warn!(
                    "Failed to get NUMERIC column '{}' as Decimal: {e}",
                    column.name()
                );
                Err(anyhow!("NUMERIC type conversion failed: {e}"))
            }
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => Ok(row
            .try_get::<_, Option<String>>(index)?
            .map(Value::String)
            .unwrap_or(Value::Null)),
        Type::TIMESTAMP => Ok(row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(|ts| Value::DateTime(DateTime::<Utc>::from_naive_utc_and_offset(ts, Utc)))
            .unwrap_or(Value::Null)),
        Type::TIMESTAMPTZ => Ok(row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(Value::DateTime)
            .unwrap_or(Value::Null)),
        Type::DATE => match row.try_get::<_, Option<NaiveDate>>(index)? {
            Some(date) => {
                let dt = date
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| anyhow!("Invalid date"))?;
                Ok(Value::DateTime(DateTime::<Utc>::from_naive_utc_and_offset(
                    dt, Utc,
                )))
            }
            None => Ok(Value::Null),
        },
        Type::TIME => Ok(row
            .try_get::<_, Option<NaiveTime>>(index)?
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null)),
        Type::JSON | Type::JSONB => Ok(row
            .try_get::<_, Option<serde_json::Value>>(index)?
            .map(Value::from)
            .unwrap_or(Value::Null)),
        Type::UUID => Ok(row
            .try_get::<_, Option<uuid::Uuid>>(index)?
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null)),
        Type::BYTEA => Ok(row
            .try_get::<_, Option<Vec<u8>>>(index)?
            .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            .unwrap_or(Value::Null)),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => Ok(row
            .try_get::<_, Option<Vec<String>>>(index)?
            .map(|arr| Value::Array(arr.into_iter().map(Value::String).collect()))
            .unwrap_or(Value::Null)),
        Type::INT4_ARRAY => Ok(row
            .try_get::<_, Option<Vec<i32>>>(index)?
            .map(|arr| Value::Array(arr.into_iter().map(|v| Value::Int(v as i64)).collect()))
            .unwrap_or(Value::Null)),
        Type::INT8_ARRAY => Ok(row
            .try_get::<_, Option<Vec<i64>>>(index)?
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int).collect()))
            .unwrap_or(Value::Null)),
        _ => {
            // For unknown types, try to get as string
            match row.try_get::<_, Option<String>>(index) {
                Ok(val) => Ok(val.map(Value::String).unwrap_or(Value::Null)),
                Err(_) => Err(anyhow!(
                    "Unsupported PostgreSQL type {pg_type:?} in column '{}'",
                    column.name()
                )),
            }
        }
    }
}

/// Encode a value as a parameter of the given PostgreSQL type.
///
/// The type comes from the prepared statement, so a document value is
/// coerced to whatever the column expects (e.g. the string `"42"` into an
/// INT4 column). Nulls are encoded as a typed `None`.
pub fn encode_param(value: &Value, pg_type: &Type) -> Result<SqlParam> {
    if value.is_null() {
        return Ok(typed_null(pg_type));
    }

    let mismatch = || {
        anyhow!(
            "Cannot encode {} value '{}' as PostgreSQL {}",
            value.kind(),
            value,
            pg_type
        )
    };

    match *pg_type {
        Type::BOOL => match value {
            Value::Bool(b) => Ok(Box::new(*b)),
            Value::Int(i) => Ok(Box::new(*i != 0)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Box::new(true)),
                "false" | "f" | "0" => Ok(Box::new(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        Type::INT2 => {
            let i = as_int(value).ok_or_else(mismatch)?;
            Ok(Box::new(i16::try_from(i).map_err(|_| mismatch())?))
        }
        Type::INT4 => {
            let i = as_int(value).ok_or_else(mismatch)?;
            Ok(Box::new(i32::try_from(i).map_err(|_| mismatch())?))
        }
        Type::INT8 => Ok(Box::new(as_int(value).ok_or_else(mismatch)?)),
        Type::FLOAT4 => Ok(Box::new(as_float(value).ok_or_else(mismatch)? as f32)),
        Type::FLOAT8 => Ok(Box::new(as_float(value).ok_or_else(mismatch)?)),
        Type::NUMERIC => {
            let d = match value {
                Value::Decimal(d) => Some(*d),
                Value::Int(i) => Some(Decimal::from(*i)),
                Value::Float(f) => Decimal::from_f64(*f),
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                _ => None,
            };
            Ok(Box::new(d.ok_or_else(mismatch)?))
        }
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => Ok(Box::new(as_text(value))),
        Type::TIMESTAMPTZ => Ok(Box::new(as_datetime(value).ok_or_else(mismatch)?)),
        Type::TIMESTAMP => Ok(Box::new(as_datetime(value).ok_or_else(mismatch)?.naive_utc())),
        Type::DATE => Ok(Box::new(as_datetime(value).ok_or_else(mismatch)?.date_naive())),
        Type::TIME => match value {
            Value::String(s) => Ok(Box::new(
                NaiveTime::from_str(s.trim()).map_err(|_| mismatch())?,
            )),
            Value::DateTime(dt) => Ok(Box::new(dt.time())),
            _ => Err(mismatch()),
        },
        Type::JSON | Type::JSONB => Ok(Box::new(value.to_json())),
        Type::UUID => match value {
            Value::String(s) => Ok(Box::new(
                uuid::Uuid::parse_str(s.trim()).map_err(|_| mismatch())?,
            )),
            _ => Err(mismatch()),
        },
        Type::BYTEA => match value {
            Value::Bytes(b) => Ok(Box::new(b.clone())),
            Value::String(s) => Ok(Box::new(s.as_bytes().to_vec())),
            _ => Err(mismatch()),
        },
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => {
            let items = value.as_array().ok_or_else(mismatch)?;
            Ok(Box::new(items.iter().map(as_text).collect::<Vec<_>>()))
        }
        Type::INT4_ARRAY => {
            let items = value.as_array().ok_or_else(mismatch)?;
            let ints = items
                .iter()
                .map(|v| as_int(v).and_then(|i| i32::try_from(i).ok()))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(mismatch)?;
            Ok(Box::new(ints))
        }
        Type::INT8_ARRAY => {
            let items = value.as_array().ok_or_else(mismatch)?;
            let ints = items
                .iter()
                .map(as_int)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(mismatch)?;
            Ok(Box::new(ints))
        }
        _ => Err(anyhow!("Unsupported PostgreSQL parameter type: {pg_type}")),
    }
}

/// Encode every value against the matching parameter type.
pub fn encode_params(values: &[&Value], types: &[Type]) -> Result<Vec<SqlParam>> {
    if values.len() != types.len() {
        return Err(anyhow!(
            "Statement expects {} parameters, got {}",
            types.len(),
            values.len()
        ));
    }
    values
        .iter()
        .zip(types)
        .map(|(value, ty)| encode_param(value, ty))
        .collect()
}

/// Borrow boxed parameters in the form `query`/`execute` accept.
pub fn param_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

fn typed_null(pg_type: &Type) -> SqlParam {
    match *pg_type {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::NUMERIC => Box::new(None::<Decimal>),
        Type::TIMESTAMPTZ => Box::new(None::<DateTime<Utc>>),
        Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
        Type::DATE => Box::new(None::<NaiveDate>),
        Type::TIME => Box::new(None::<NaiveTime>),
        Type::JSON | Type::JSONB => Box::new(None::<serde_json::Value>),
        Type::UUID => Box::new(None::<uuid::Uuid>),
        Type::BYTEA => Box::new(None::<Vec<u8>>),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => Box::new(None::<Vec<String>>),
        Type::INT4_ARRAY => Box::new(None::<Vec<i32>>),
        Type::INT8_ARRAY => Box::new(None::<Vec<i64>>),
        _ => Box::new(None::<String>),
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::Decimal(d) => d.trunc().to_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::Decimal(d) => d.to_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_json().to_string(),
        other => other.to_string(),
    }
}

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::String(s) => sync_core::convert::parse_datetime(s, None).ok(),
        Value::Int(ticks) => DateTime::<Utc>::from_timestamp_millis(*ticks),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_coerces_document_strings() {
        assert!(encode_param(&Value::from("42"), &Type::INT4).is_ok());
        assert!(encode_param(&Value::from("42"), &Type::INT8).is_ok());
        assert!(encode_param(&Value::from("12.50"), &Type::NUMERIC).is_ok());
        assert!(encode_param(&Value::from("2024-03-01"), &Type::DATE).is_ok());
        assert!(encode_param(&Value::from("t"), &Type::BOOL).is_ok());
    }

    #[test]
    fn test_encode_rejects_out_of_range_and_garbage() {
        assert!(encode_param(&Value::Int(i64::MAX), &Type::INT4).is_err());
        assert!(encode_param(&Value::from("abc"), &Type::INT8).is_err());
        assert!(encode_param(&Value::from("not-a-uuid"), &Type::UUID).is_err());
        assert!(encode_param(&Value::Bool(true), &Type::TIMESTAMPTZ).is_err());
    }

    #[test]
    fn test_encode_nulls_for_every_type() {
        for ty in [Type::INT4, Type::TEXT, Type::TIMESTAMPTZ, Type::JSONB, Type::UUID] {
            assert!(encode_param(&Value::Null, &ty).is_ok());
        }
    }

    #[test]
    fn test_encode_params_checks_arity() {
        let id = Value::Int(1);
        assert!(encode_params(&[&id], &[Type::INT4, Type::TEXT]).is_err());
        assert_eq!(encode_params(&[&id], &[Type::INT4]).unwrap().len(), 1);
    }

    #[test]
    fn test_as_text_serializes_compound_values() {
        let v = Value::Array(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(as_text(&v), r#"[1,"a"]"#);
        assert_eq!(as_text(&Value::Int(7)), "7");
    }

    #[test]
    fn test_as_datetime_accepts_ticks_and_strings() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            as_datetime(&Value::Int(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(as_datetime(&Value::from("2024-03-01")), Some(expected));
    }
}
