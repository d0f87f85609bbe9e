//! Row decoding: PostgreSQL values to JSON.
//!
//! Values are decoded by the column's declared type rather than by trial and
//! error, so an `INT4` column never comes back as a float and a `NULL` stays
//! `null` whatever the type.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::postgres::{PgRow, PgTypeKind};
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo};
use uuid::Uuid;

/// One row as an ordered `column -> value` map (column order preserved).
pub fn row_to_map(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();
    for column in row.columns() {
        let value = decode_column(row, column);
        map.insert(column.name().to_string(), value);
    }
    map
}

fn decode_column(row: &PgRow, column: &sqlx::postgres::PgColumn) -> Value {
    let idx = column.ordinal();
    let type_info = column.type_info();

    let value = match type_info.name() {
        "BOOL" => get::<bool>(row, idx),
        "INT2" => get::<i16>(row, idx),
        "INT4" => get::<i32>(row, idx),
        "INT8" => get::<i64>(row, idx),
        "FLOAT4" => get::<f32>(row, idx),
        "FLOAT8" => get::<f64>(row, idx),
        // Arbitrary precision; a JSON number would round.
        "NUMERIC" => get_with::<BigDecimal>(row, idx, |v| Value::String(v.to_string())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => get::<String>(row, idx),
        "JSON" | "JSONB" => get::<Value>(row, idx),
        "UUID" => get::<Uuid>(row, idx),
        "DATE" => get::<NaiveDate>(row, idx),
        "TIME" => get::<NaiveTime>(row, idx),
        "TIMESTAMP" => get::<NaiveDateTime>(row, idx),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, idx),
        "BYTEA" => get_with::<Vec<u8>>(row, idx, |v| Value::String(BASE64.encode(v))),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => get::<Vec<Option<String>>>(row, idx),
        "INT2[]" => get::<Vec<Option<i16>>>(row, idx),
        "INT4[]" => get::<Vec<Option<i32>>>(row, idx),
        "INT8[]" => get::<Vec<Option<i64>>>(row, idx),
        "FLOAT8[]" => get::<Vec<Option<f64>>>(row, idx),
        "BOOL[]" => get::<Vec<Option<bool>>>(row, idx),
        "UUID[]" => get::<Vec<Option<Uuid>>>(row, idx),
        _ => fallback(row, idx, type_info.kind()),
    };

    value.unwrap_or_else(|| {
        tracing::debug!(
            column = column.name(),
            pg_type = type_info.name(),
            "value not decodable, returning null"
        );
        Value::Null
    })
}

fn get<T>(row: &PgRow, idx: usize) -> Option<Value>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres> + Serialize,
{
    get_with::<T>(row, idx, |v| serde_json::to_value(v).unwrap_or(Value::Null))
}

fn get_with<T>(row: &PgRow, idx: usize, to_json: impl FnOnce(T) -> Value) -> Option<Value>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Some(to_json(v)),
        Ok(None) => Some(Value::Null),
        Err(_) => None,
    }
}

/// Enum labels travel as text; anything else tries text and otherwise gives up.
fn fallback(row: &PgRow, idx: usize, kind: &PgTypeKind) -> Option<Value> {
    let text = match kind {
        PgTypeKind::Enum(_) => row.try_get_unchecked::<Option<String>, _>(idx),
        _ => row.try_get::<Option<String>, _>(idx),
    };
    text.ok().map(|v| v.map(Value::String).unwrap_or(Value::Null))
}
