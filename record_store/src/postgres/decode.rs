//! Row decoding
//!
//! Converts `PgRow`s into ordered JSON maps keyed by column name, picking a
//! Rust type per column from its Postgres type name. Types without a mapping
//! are read as text when Postgres can send them that way, and as null
//! otherwise.

use crate::errors::StoreError;
use crate::query_builder::request::Row;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row as _, TypeInfo};
use std::fmt::Write as _;
use tracing::debug;
use uuid::Uuid;

/// Decode every column of `row`
pub fn row_to_map(row: &PgRow, table: &str) -> Result<Row, StoreError> {
    let mut map = Map::with_capacity(row.columns().len());

    for column in row.columns() {
        let value = decode_column(row, column.ordinal(), column.type_info().name())
            .map_err(|e| StoreError::decode(table, format!("column {}: {}", column.name(), e)))?;
        map.insert(column.name().to_string(), value);
    }

    Ok(map)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|f| Value::from(f as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)?
            .map(|d| decimal_value(&d)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::String)
        }
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)?
            .map(|u| Value::String(u.to_string())),
        "TIMESTAMPTZ" => serialize(row.try_get::<Option<DateTime<Utc>>, _>(index)?),
        "TIMESTAMP" => serialize(row.try_get::<Option<NaiveDateTime>, _>(index)?),
        "DATE" => serialize(row.try_get::<Option<NaiveDate>, _>(index)?),
        "TIME" => serialize(row.try_get::<Option<NaiveTime>, _>(index)?),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?,
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)?
            .map(|bytes| Value::String(bytea_hex(&bytes))),
        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(index)?
            .map(|interval| interval_value(&interval)),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            serialize(row.try_get::<Option<Vec<String>>, _>(index)?)
        }
        "INT2[]" => serialize(row.try_get::<Option<Vec<i16>>, _>(index)?),
        "INT4[]" => serialize(row.try_get::<Option<Vec<i32>>, _>(index)?),
        "INT8[]" => serialize(row.try_get::<Option<Vec<i64>>, _>(index)?),
        "FLOAT4[]" => serialize(row.try_get::<Option<Vec<f32>>, _>(index)?),
        "FLOAT8[]" => serialize(row.try_get::<Option<Vec<f64>>, _>(index)?),
        "NUMERIC[]" => row
            .try_get::<Option<Vec<Decimal>>, _>(index)?
            .map(|items| Value::Array(items.iter().map(decimal_value).collect())),
        "BOOL[]" => serialize(row.try_get::<Option<Vec<bool>>, _>(index)?),
        "UUID[]" => serialize(row.try_get::<Option<Vec<Uuid>>, _>(index)?),
        "TIMESTAMPTZ[]" => serialize(row.try_get::<Option<Vec<DateTime<Utc>>>, _>(index)?),
        "DATE[]" => serialize(row.try_get::<Option<Vec<NaiveDate>>, _>(index)?),
        "JSON[]" | "JSONB[]" => serialize(row.try_get::<Option<Vec<Value>>, _>(index)?),
        // enums and other text-encoded types
        _ => match row.try_get_unchecked::<Option<String>, _>(index) {
            Ok(text) => text.map(Value::String),
            Err(e) => {
                debug!(type_name, index, error = %e, "no decoder for column type, using null");
                None
            }
        },
    };

    Ok(value.unwrap_or(Value::Null))
}

/// Whole numbers stay integers so they decode into integer fields
fn decimal_value(decimal: &Decimal) -> Value {
    if decimal.scale() == 0 {
        if let Some(i) = decimal.to_i64() {
            return Value::from(i);
        }
    }
    decimal.to_f64().map(Value::from).unwrap_or(Value::Null)
}

/// Postgres hex output format, e.g. `\x00ff`
fn bytea_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn interval_value(interval: &PgInterval) -> Value {
    json!({
        "months": interval.months,
        "days": interval.days,
        "microseconds": interval.microseconds,
    })
}

fn serialize<T: Serialize>(value: Option<T>) -> Option<Value> {
    value.and_then(|v| serde_json::to_value(v).ok())
}
