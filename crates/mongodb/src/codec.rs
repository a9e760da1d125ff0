//! BSON <-> [`sync_core::Value`] conversion.
//!
//! Decoding is lossy for BSON-only types: ObjectIds become their hex
//! string, Decimal128 becomes a decimal when it parses, and exotic types
//! (regex, code, min/max key) fall back to their display form.

use bson::spec::BinarySubtype;
use bson::{Binary, Bson, DateTime as BsonDateTime, Document};
use rust_decimal::Decimal;
use std::str::FromStr;
use sync_core::{Record, Value};

/// Convert a BSON value into a [`Value`].
pub fn bson_to_value(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(i) => Value::Int(i as i64),
        Bson::Int64(i) => Value::Int(i),
        Bson::Double(f) => Value::Float(f),
        Bson::Decimal128(d) => {
            let s = d.to_string();
            match Decimal::from_str(&s) {
                Ok(decimal) => Value::Decimal(decimal),
                Err(_) => Value::String(s),
            }
        }
        Bson::String(s) | Bson::Symbol(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::DateTime(dt.to_chrono()),
        Bson::Timestamp(ts) => {
            match chrono::DateTime::from_timestamp(ts.time as i64, 0) {
                Some(dt) => Value::DateTime(dt),
                None => Value::Int(ts.time as i64),
            }
        }
        Bson::Binary(bin) => decode_binary(bin),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_value).collect()),
        Bson::Document(doc) => Value::Object(document_to_record(doc)),
        other => Value::String(other.to_string()),
    }
}

fn decode_binary(bin: Binary) -> Value {
    if matches!(bin.subtype, BinarySubtype::Uuid | BinarySubtype::UuidOld) {
        if let Ok(uuid) = uuid::Uuid::from_slice(&bin.bytes) {
            return Value::String(uuid.to_string());
        }
    }
    Value::Bytes(bin.bytes)
}

/// Convert a BSON document into a [`Record`].
pub fn document_to_record(doc: Document) -> Record {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_value(value)))
        .collect()
}

/// Convert a [`Value`] into BSON.
///
/// Integers that fit in 32 bits are written as Int32 so ids written from a
/// relational INT column match documents created by other clients.
/// Decimals are stored as strings.
pub fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(*i),
        },
        Value::Float(f) => Bson::Double(*f),
        Value::Decimal(d) => Bson::String(d.to_string()),
        Value::String(s) => Bson::String(s.clone()),
        Value::Bytes(b) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: b.clone(),
        }),
        Value::DateTime(dt) => Bson::DateTime(BsonDateTime::from_chrono(*dt)),
        Value::Array(items) => Bson::Array(items.iter().map(value_to_bson).collect()),
        Value::Object(record) => Bson::Document(record_to_document(record)),
    }
}

/// Convert a [`Record`] into a BSON document.
pub fn record_to_document(record: &Record) -> Document {
    record
        .iter()
        .map(|(key, value)| (key.clone(), value_to_bson(value)))
        .collect()
}
