//! Database-agnostic value decoding.
//!
//! Result rows are decoded into `serde_json::Value`s so the formatter can
//! render every operation's output the same way.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies a column type name into a logical category
//! 2. Backend-specific decoders extract the value for that category
//!
//! Free-text statements run over PostgreSQL's simple query protocol, so
//! values arrive in text format and any type without a dedicated decoder can
//! still be read as its text representation.

use crate::db::Backend;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    /// Timestamp with time zone
    TimestampTz,
    Timestamp,
    Date,
    Time,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, backend: Backend) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Temporal types first: "interval" and "timestamp" would otherwise
    // collide with the substring checks below.
    match lower.as_str() {
        "timestamptz" | "timestamp with time zone" => return TypeCategory::TimestampTz,
        "timestamp" | "timestamp without time zone" | "datetime" => {
            return TypeCategory::Timestamp;
        }
        "date" => return TypeCategory::Date,
        "time" | "time without time zone" => return TypeCategory::Time,
        "interval" | "timetz" | "time with time zone" => return TypeCategory::Text,
        _ => {}
    }

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is a storage affinity, not an exact type
        if backend == Backend::Sqlite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if matches!(
        lower.as_str(),
        "int" | "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint" | "tinyint"
    ) || lower.contains("serial")
    {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower == "text" || lower == "name" || lower == "citext" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw NUMERIC value as the database prints it. Preserves exact precision.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Shared value helpers
// =============================================================================

/// Binary data as UTF-8 text when valid, base64 otherwise.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

pub fn format_timestamptz(v: &DateTime<Utc>) -> String {
    v.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub fn format_timestamp(v: &NaiveDateTime) -> String {
    v.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_date(v: &NaiveDate) -> String {
    v.format(DATE_FORMAT).to_string()
}

pub fn format_time(v: &NaiveTime) -> String {
    v.format(TIME_FORMAT).to_string()
}

fn unsupported(type_name: &str) -> JsonValue {
    JsonValue::String(format!("<unsupported type {}>", type_name))
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Conversion of a driver row into column names and JSON values.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_json_values(&self) -> Vec<JsonValue>;
}

impl RowToJson for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, Backend::Postgres);
                postgres::decode_column(self, idx, type_name, category)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn to_json_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), Backend::Sqlite);
                sqlite::decode_column(self, idx, category)
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to read column");
                return JsonValue::Null;
            }
        }

        let decoded = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| decode_binary_value(&v)),
            TypeCategory::Json => row.try_get::<JsonValue, _>(idx).ok(),
            TypeCategory::Uuid => row
                .try_get::<uuid::Uuid, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_string())),
            TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .ok()
                .map(|v| JsonValue::String(format_timestamptz(&v))),
            TypeCategory::Timestamp => row
                .try_get::<NaiveDateTime, _>(idx)
                .ok()
                .map(|v| JsonValue::String(format_timestamp(&v))),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .ok()
                .map(|v| JsonValue::String(format_date(&v))),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)
                .ok()
                .map(|v| JsonValue::String(format_time(&v))),
            TypeCategory::Text | TypeCategory::Unknown => None,
        };

        decoded.unwrap_or_else(|| decode_text(row, idx, type_name))
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Option<JsonValue> {
        match row.try_get::<RawDecimal, _>(idx) {
            Ok(v) => Some(JsonValue::String(v.0)),
            Err(e) => {
                tracing::debug!(error = ?e, "NUMERIC not in text format, falling back");
                None
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(JsonValue::Number(v.into()));
        }
        None
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_value(v));
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Some(float_value(v as f64));
        }
        None
    }

    /// Text representation of any value (simple query protocol).
    fn decode_text(row: &PgRow, idx: usize, type_name: &str) -> JsonValue {
        match row.try_get_unchecked::<String, _>(idx) {
            Ok(v) => JsonValue::String(v),
            Err(_) => unsupported(type_name),
        }
    }
}

mod sqlite {
    use super::*;

    /// SQLite is dynamically typed: the storage class of each value decides
    /// how it is read, the declared column type only refines it.
    pub fn decode_column(row: &SqliteRow, idx: usize, declared: TypeCategory) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_uppercase(),
            Err(e) => {
                tracing::error!(column = idx, error = %e, "Failed to read column");
                return JsonValue::Null;
            }
        };

        match storage.as_str() {
            "INTEGER" | "INT8" | "BOOLEAN" => match row.try_get_unchecked::<i64, _>(idx) {
                Ok(v) if declared == TypeCategory::Boolean => JsonValue::Bool(v != 0),
                Ok(v) => JsonValue::Number(v.into()),
                Err(_) => unsupported(&storage),
            },
            "REAL" => match row.try_get_unchecked::<f64, _>(idx) {
                Ok(v) => float_value(v),
                Err(_) => unsupported(&storage),
            },
            "BLOB" => match row.try_get_unchecked::<Vec<u8>, _>(idx) {
                Ok(v) => decode_binary_value(&v),
                Err(_) => unsupported(&storage),
            },
            _ => decode_text(row, idx, declared, &storage),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize, declared: TypeCategory, storage: &str) -> JsonValue {
        match row.try_get_unchecked::<String, _>(idx) {
            Ok(v) if declared == TypeCategory::Json => {
                serde_json::from_str::<JsonValue>(&v).unwrap_or(JsonValue::String(v))
            }
            Ok(v) => JsonValue::String(v),
            Err(_) => unsupported(storage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT4", Backend::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", Backend::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", Backend::Sqlite),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("bigserial", Backend::Postgres),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_does_not_confuse_interval_with_int() {
        assert_eq!(
            categorize_type("INTERVAL", Backend::Postgres),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("POINT", Backend::Postgres),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("NUMERIC", Backend::Postgres),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("numeric", Backend::Sqlite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", Backend::Postgres),
            TypeCategory::TimestampTz
        );
        assert_eq!(
            categorize_type("TIMESTAMP", Backend::Postgres),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATETIME", Backend::Sqlite),
            TypeCategory::Timestamp
        );
        assert_eq!(categorize_type("DATE", Backend::Postgres), TypeCategory::Date);
        assert_eq!(categorize_type("TIME", Backend::Postgres), TypeCategory::Time);
    }

    #[test]
    fn test_categorize_type_json() {
        assert_eq!(
            categorize_type("json", Backend::Postgres),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("JSONB", Backend::Postgres),
            TypeCategory::Json
        );
    }

    #[test]
    fn test_temporal_formatting() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(14, 5, 7, 250)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-09 14:05:07.250");
        assert_eq!(format_timestamptz(&ts.and_utc()), "2024-03-09T14:05:07.250Z");
        assert_eq!(format_date(&ts.date()), "2024-03-09");

        let whole = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        assert_eq!(format_time(&whole), "08:30:00");
    }

    #[test]
    fn test_decode_binary_value_with_valid_utf8() {
        let result = decode_binary_value(b"hello world");
        assert_eq!(result, JsonValue::String("hello world".to_string()));
    }

    #[test]
    fn test_decode_binary_value_with_invalid_utf8() {
        let bytes: &[u8] = &[0xFF, 0xFE, 0x00, 0x01];
        let result = decode_binary_value(bytes);
        assert_eq!(result, JsonValue::String("//4AAQ==".to_string()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }
}
