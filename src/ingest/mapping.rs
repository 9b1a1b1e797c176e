//! Record to row mapping.
//!
//! Each record becomes the table's column tuple in column order. Required
//! columns must be present and non-null; optional ones default to NULL.
//! Values are coerced to the column's type, and anything that cannot be
//! coerced is rejected before a single row is written.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::types::BigDecimal;
use std::path::Path;
use std::str::FromStr;

use crate::db::schema::{Column, SqlType, TableSpec};
use crate::db::SqlValue;
use crate::error::{LoadError, Result};
use crate::formats::{RawValue, Record};

const DATE_FORMAT: &str = "%Y-%m-%d";

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",    // 2024-01-05 10:30:00
    "%Y-%m-%dT%H:%M:%S",    // 2024-01-05T10:30:00
    "%Y-%m-%d %H:%M:%S%.f", // with fractional seconds
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M", // without seconds
    "%Y-%m-%dT%H:%M",
];

/// Map every record of a file, failing on the first one that does not fit
pub fn map_records(table: &TableSpec, records: &[Record], path: &Path) -> Result<Vec<Vec<SqlValue>>> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| map_record(table, record, index, path))
        .collect()
}

pub fn map_record(
    table: &TableSpec,
    record: &Record,
    index: usize,
    path: &Path,
) -> Result<Vec<SqlValue>> {
    table
        .columns
        .iter()
        .map(|column| {
            let value = match record.get(column.name) {
                Some(raw) => coerce(column, raw),
                None if column.nullable => Ok(null_of(column.sql_type)),
                None => Err(format!("missing required column '{}'", column.name)),
            };
            value.map_err(|message| LoadError::parse(path, format!("record {index}: {message}")))
        })
        .collect()
}

fn null_of(sql_type: SqlType) -> SqlValue {
    match sql_type {
        SqlType::Varchar(_) => SqlValue::Text(None),
        SqlType::Integer | SqlType::Serial => SqlValue::Integer(None),
        SqlType::Numeric(..) => SqlValue::Decimal(None),
        SqlType::Date => SqlValue::Date(None),
        SqlType::Timestamp => SqlValue::Timestamp(None),
    }
}

fn coerce(column: &Column, raw: &RawValue) -> std::result::Result<SqlValue, String> {
    let invalid = |expected: &str| {
        format!(
            "column '{}' expects {expected}, got '{raw}'",
            column.name
        )
    };

    match column.sql_type {
        SqlType::Varchar(_) => Ok(SqlValue::Text(Some(raw.to_string()))),
        SqlType::Integer | SqlType::Serial => to_integer(raw)
            .map(|v| SqlValue::Integer(Some(v)))
            .ok_or_else(|| invalid("an integer")),
        SqlType::Numeric(..) => to_decimal(raw)
            .map(|v| SqlValue::Decimal(Some(v)))
            .ok_or_else(|| invalid("a number")),
        SqlType::Date => to_date(raw)
            .map(|v| SqlValue::Date(Some(v)))
            .ok_or_else(|| invalid("a date (YYYY-MM-DD)")),
        SqlType::Timestamp => to_timestamp(raw)
            .map(|v| SqlValue::Timestamp(Some(v)))
            .ok_or_else(|| invalid("a timestamp (YYYY-MM-DD HH:MM:SS)")),
    }
}

fn to_integer(raw: &RawValue) -> Option<i64> {
    match raw {
        RawValue::Integer(i) => Some(*i),
        RawValue::Float(x) => whole(*x),
        RawValue::Text(s) => {
            let s = s.trim();
            s.parse().ok().or_else(|| s.parse().ok().and_then(whole))
        }
        _ => None,
    }
}

fn whole(x: f64) -> Option<i64> {
    (x.fract() == 0.0 && x.abs() < i64::MAX as f64).then_some(x as i64)
}

/// Decimals are parsed from their text so the stored value matches the source digits
fn to_decimal(raw: &RawValue) -> Option<BigDecimal> {
    match raw {
        RawValue::Integer(i) => Some(BigDecimal::from(*i)),
        RawValue::Float(x) if x.is_finite() => BigDecimal::from_str(&x.to_string()).ok(),
        RawValue::Text(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn to_date(raw: &RawValue) -> Option<NaiveDate> {
    let RawValue::Text(s) = raw else {
        return None;
    };
    let s = s.trim();

    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_timestamp(s).map(|ts| ts.date()))
}

fn to_timestamp(raw: &RawValue) -> Option<NaiveDateTime> {
    let RawValue::Text(s) = raw else {
        return None;
    };
    let s = s.trim();

    parse_timestamp(s).or_else(|| {
        NaiveDate::parse_from_str(s, DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}
