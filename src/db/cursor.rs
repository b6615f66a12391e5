//! Row cursors.
//!
//! A [`RowCursor`] is the one capability fetchers and getters need from a
//! native result: read a column in its native representation and describe the
//! result shape. Implementations exist for the sqlx rows of every supported
//! driver, plus [`MemoryRow`] for results held in memory.

use crate::db::types::require_value_type;
use crate::error::{DbError, DbResult, NativeError};
use crate::models::{ColumnMetadata, DatabaseKind, ResultMetadata, Value, ValueType};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The current row of a result.
pub trait RowCursor {
    fn column_count(&self) -> usize;

    /// Describe the result columns.
    fn metadata(&self) -> DbResult<ResultMetadata>;

    /// Describe the column at the zero-based `position`.
    fn column(&self, position: usize) -> Option<ColumnMetadata>;

    /// Read the column at the zero-based `position` in its native value type.
    fn read(&self, position: usize) -> DbResult<Value>;
}

impl RowCursor for PgRow {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn metadata(&self) -> DbResult<ResultMetadata> {
        Ok(ResultMetadata::new(
            DatabaseKind::PostgreSQL,
            column_metadata(self),
        ))
    }

    fn column(&self, position: usize) -> Option<ColumnMetadata> {
        column_at(self, position)
    }

    fn read(&self, position: usize) -> DbResult<Value> {
        postgres::read(self, position)
    }
}

impl RowCursor for MySqlRow {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn metadata(&self) -> DbResult<ResultMetadata> {
        Ok(ResultMetadata::new(DatabaseKind::MySQL, column_metadata(self)))
    }

    fn column(&self, position: usize) -> Option<ColumnMetadata> {
        column_at(self, position)
    }

    fn read(&self, position: usize) -> DbResult<Value> {
        mysql::read(self, position)
    }
}

impl RowCursor for SqliteRow {
    fn column_count(&self) -> usize {
        self.len()
    }

    fn metadata(&self) -> DbResult<ResultMetadata> {
        Ok(ResultMetadata::new(DatabaseKind::SQLite, column_metadata(self)))
    }

    fn column(&self, position: usize) -> Option<ColumnMetadata> {
        column_at(self, position)
    }

    fn read(&self, position: usize) -> DbResult<Value> {
        sqlite::read(self, position)
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn column_metadata<R: Row>(row: &R) -> Vec<ColumnMetadata> {
    row.columns()
        .iter()
        .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
        .collect()
}

fn column_at<R: Row>(row: &R, position: usize) -> Option<ColumnMetadata> {
    row.columns()
        .get(position)
        .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
}

/// Name and native type name of a column, checking the position.
fn column_of<R: Row>(row: &R, position: usize) -> DbResult<(String, String)> {
    row.columns()
        .get(position)
        .map(|col| (col.name().to_string(), col.type_info().name().to_string()))
        .ok_or_else(|| {
            DbError::invalid_input(format!(
                "Column position {} out of bounds (columns: {})",
                position,
                row.len()
            ))
        })
}

fn decode<'r, R, T>(row: &'r R, position: usize, native_type: &str) -> DbResult<Option<T>>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<Option<T>, _>(position).map_err(|e| {
        let column = row
            .columns()
            .get(position)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| format!("#{}", position));
        DbError::conversion(column, native_type, NativeError::from(e).message)
    })
}

/// Decode as text without the driver's type compatibility check.
fn decode_text<R>(row: &R, position: usize, column: &str, native_type: &str) -> DbResult<Value>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get_unchecked::<Option<String>, _>(position)
        .map(|v| or_null(v, Value::String))
        .map_err(|e| DbError::conversion(column, native_type, NativeError::from(e).message))
}

fn narrow<T: TryFrom<i64>>(
    value: Option<i64>,
    column: &str,
    native_type: &str,
    wrap: impl Fn(T) -> Value,
) -> DbResult<Value> {
    match value {
        None => Ok(Value::Null),
        Some(v) => T::try_from(v).map(wrap).map_err(|_| {
            DbError::conversion(column, native_type, format!("{} does not fit the column type", v))
        }),
    }
}

fn or_null<T>(value: Option<T>, wrap: impl FnOnce(T) -> Value) -> Value {
    value.map(wrap).unwrap_or(Value::Null)
}

// =============================================================================
// Database-Specific Readers
// =============================================================================

mod postgres {
    use super::*;
    use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::postgres::types::{Oid, PgInterval, PgTimeTz};
    use sqlx::types::{JsonValue, Uuid};

    pub fn read(row: &PgRow, position: usize) -> DbResult<Value> {
        let (column, type_name) = column_of(row, position)?;
        let vt = require_value_type(DatabaseKind::PostgreSQL, &type_name)?;

        match type_name.to_ascii_uppercase().as_str() {
            "TIMESTAMPTZ" => {
                let v = decode::<_, DateTime<Utc>>(row, position, &type_name)?;
                return Ok(or_null(v, |v| Value::Timestamp(v.naive_utc())));
            }
            "TIMETZ" => {
                let v = decode::<_, PgTimeTz<NaiveTime, FixedOffset>>(row, position, &type_name)?;
                return Ok(or_null(v, |v| Value::Time(utc_time(&v))));
            }
            "OID" => {
                let v = decode::<_, Oid>(row, position, &type_name)?;
                return Ok(or_null(v, |v| Value::Long(i64::from(v.0))));
            }
            "UUID" => {
                let v = decode::<_, Uuid>(row, position, &type_name)?;
                return Ok(or_null(v, |v| Value::String(v.to_string())));
            }
            "JSON" | "JSONB" => {
                let v = decode::<_, JsonValue>(row, position, &type_name)?;
                return Ok(or_null(v, |v| Value::String(v.to_string())));
            }
            "INTERVAL" => {
                let v = decode::<_, PgInterval>(row, position, &type_name)?;
                return Ok(or_null(v, |v| Value::String(interval_text(&v))));
            }
            "VOID" => return Ok(Value::Null),
            "UNKNOWN" => return decode_text(row, position, &column, &type_name),
            _ => {}
        }

        Ok(match vt {
            ValueType::Boolean => or_null(decode::<_, bool>(row, position, &type_name)?, Value::Boolean),
            ValueType::Byte => or_null(decode::<_, i8>(row, position, &type_name)?, Value::Byte),
            ValueType::Short => or_null(decode::<_, i16>(row, position, &type_name)?, Value::Short),
            ValueType::Int => or_null(decode::<_, i32>(row, position, &type_name)?, Value::Int),
            ValueType::Long => or_null(decode::<_, i64>(row, position, &type_name)?, Value::Long),
            ValueType::Float => or_null(decode::<_, f32>(row, position, &type_name)?, Value::Float),
            ValueType::Double => or_null(decode::<_, f64>(row, position, &type_name)?, Value::Double),
            ValueType::Decimal => {
                or_null(decode::<_, Decimal>(row, position, &type_name)?, Value::Decimal)
            }
            ValueType::String => {
                or_null(decode::<_, String>(row, position, &type_name)?, Value::String)
            }
            ValueType::Date => or_null(decode::<_, NaiveDate>(row, position, &type_name)?, Value::Date),
            ValueType::Time => or_null(decode::<_, NaiveTime>(row, position, &type_name)?, Value::Time),
            ValueType::Timestamp => or_null(
                decode::<_, NaiveDateTime>(row, position, &type_name)?,
                Value::Timestamp,
            ),
        })
    }

    /// Wall-clock time in UTC, wrapping around midnight.
    pub(super) fn utc_time(value: &PgTimeTz<NaiveTime, FixedOffset>) -> NaiveTime {
        let offset = Duration::seconds(i64::from(value.offset.local_minus_utc()));
        value.time.overflowing_sub_signed(offset).0
    }

    /// ISO 8601 duration text, e.g. `P1Y2M3DT4H5M6.5S`.
    pub(super) fn interval_text(interval: &PgInterval) -> String {
        let mut text = String::from("P");
        for (amount, unit) in [
            (interval.months / 12, 'Y'),
            (interval.months % 12, 'M'),
            (interval.days, 'D'),
        ] {
            if amount != 0 {
                text.push_str(&format!("{}{}", amount, unit));
            }
        }

        let micros = interval.microseconds;
        if micros != 0 {
            text.push('T');
            let hours = micros / 3_600_000_000;
            let minutes = (micros / 60_000_000) % 60;
            let seconds = Decimal::new(micros % 60_000_000, 6).normalize();
            if hours != 0 {
                text.push_str(&format!("{}H", hours));
            }
            if minutes != 0 {
                text.push_str(&format!("{}M", minutes));
            }
            if !seconds.is_zero() {
                text.push_str(&format!("{}S", seconds));
            }
        }

        if text == "P" {
            text.push_str("T0S");
        }
        text
    }
}

mod mysql {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use rust_decimal::Decimal;
    use sqlx::types::JsonValue;

    pub fn read(row: &MySqlRow, position: usize) -> DbResult<Value> {
        let (column, type_name) = column_of(row, position)?;
        let vt = require_value_type(DatabaseKind::MySQL, &type_name)?;

        match type_name.to_ascii_uppercase().as_str() {
            "NULL" => return Ok(Value::Null),
            "JSON" => {
                let v = decode::<_, JsonValue>(row, position, &type_name)?;
                return Ok(or_null(v, |v| Value::String(v.to_string())));
            }
            "BIT" => {
                let v = row
                    .try_get_unchecked::<Option<u64>, _>(position)
                    .map_err(|e| DbError::conversion(&column, &type_name, NativeError::from(e).message))?;
                return match v {
                    None => Ok(Value::Null),
                    Some(v) => i64::try_from(v).map(Value::Long).map_err(|_| {
                        DbError::conversion(&column, &type_name, format!("{} is out of range", v))
                    }),
                };
            }
            "YEAR" => {
                let v = row
                    .try_get_unchecked::<Option<u16>, _>(position)
                    .map_err(|e| DbError::conversion(&column, &type_name, NativeError::from(e).message))?;
                return narrow(v.map(i64::from), &column, &type_name, Value::Short);
            }
            _ => {}
        }

        // Unsigned columns are widened into the next larger signed kind.
        if type_name.to_ascii_uppercase().ends_with("UNSIGNED") {
            let v = decode::<_, u64>(row, position, &type_name)?;
            return match (vt, v) {
                (_, None) => Ok(Value::Null),
                (ValueType::Decimal, Some(v)) => Ok(Value::Decimal(Decimal::from(v))),
                (_, Some(v)) => {
                    let signed = i64::try_from(v).map_err(|_| {
                        DbError::conversion(&column, &type_name, format!("{} is out of range", v))
                    })?;
                    match vt {
                        ValueType::Short => narrow(Some(signed), &column, &type_name, Value::Short),
                        ValueType::Int => narrow(Some(signed), &column, &type_name, Value::Int),
                        _ => Ok(Value::Long(signed)),
                    }
                }
            };
        }

        match vt {
            ValueType::Boolean => Ok(or_null(
                decode::<_, bool>(row, position, &type_name)?,
                Value::Boolean,
            )),
            ValueType::Byte | ValueType::Short | ValueType::Int | ValueType::Long => {
                let v = decode::<_, i64>(row, position, &type_name)?;
                match vt {
                    ValueType::Byte => narrow(v, &column, &type_name, Value::Byte),
                    ValueType::Short => narrow(v, &column, &type_name, Value::Short),
                    ValueType::Int => narrow(v, &column, &type_name, Value::Int),
                    _ => Ok(or_null(v, Value::Long)),
                }
            }
            ValueType::Float => Ok(or_null(decode::<_, f32>(row, position, &type_name)?, Value::Float)),
            ValueType::Double => Ok(or_null(decode::<_, f64>(row, position, &type_name)?, Value::Double)),
            ValueType::Decimal => Ok(or_null(
                decode::<_, Decimal>(row, position, &type_name)?,
                Value::Decimal,
            )),
            // SET columns fail the driver's text check
            ValueType::String => decode_text(row, position, &column, &type_name),
            ValueType::Date => Ok(or_null(
                decode::<_, NaiveDate>(row, position, &type_name)?,
                Value::Date,
            )),
            ValueType::Time => Ok(or_null(
                decode::<_, NaiveTime>(row, position, &type_name)?,
                Value::Time,
            )),
            ValueType::Timestamp => Ok(or_null(
                decode::<_, NaiveDateTime>(row, position, &type_name)?,
                Value::Timestamp,
            )),
        }
    }
}

mod sqlite {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    /// SQLite values carry their own storage class; the declared column type
    /// only decides between text and the temporal/boolean kinds stored in it.
    pub fn read(row: &SqliteRow, position: usize) -> DbResult<Value> {
        let (column, type_name) = column_of(row, position)?;
        let vt = require_value_type(DatabaseKind::SQLite, &type_name)?;

        let storage = {
            let raw = row
                .try_get_raw(position)
                .map_err(|e| DbError::conversion(&column, &type_name, NativeError::from(e).message))?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            raw.type_info().name().to_string()
        };

        match vt {
            ValueType::Boolean => Ok(or_null(
                decode::<_, bool>(row, position, &type_name)?,
                Value::Boolean,
            )),
            ValueType::Date => Ok(or_null(
                decode::<_, NaiveDate>(row, position, &type_name)?,
                Value::Date,
            )),
            ValueType::Time => Ok(or_null(
                decode::<_, NaiveTime>(row, position, &type_name)?,
                Value::Time,
            )),
            ValueType::Timestamp => Ok(or_null(
                decode::<_, NaiveDateTime>(row, position, &type_name)?,
                Value::Timestamp,
            )),
            _ => match storage.as_str() {
                "INTEGER" => Ok(or_null(decode::<_, i64>(row, position, &storage)?, Value::Long)),
                "REAL" => Ok(or_null(decode::<_, f64>(row, position, &storage)?, Value::Double)),
                "TEXT" => Ok(or_null(
                    decode::<_, String>(row, position, &storage)?,
                    Value::String,
                )),
                other => Err(DbError::initialization(format!(
                    "SQLite storage class '{}' of column '{}' is not mapped to a value type",
                    other, column
                ))),
            },
        }
    }
}

// =============================================================================
// In-Memory Rows
// =============================================================================

/// A row held in memory.
///
/// Values are returned as stored; the metadata reports the declared column
/// names and native type names. Calls to [`RowCursor::metadata`] are counted.
#[derive(Debug)]
pub struct MemoryRow {
    metadata: ResultMetadata,
    values: Vec<Value>,
    metadata_calls: AtomicUsize,
}

impl MemoryRow {
    pub fn new(metadata: ResultMetadata, values: Vec<Value>) -> DbResult<Self> {
        if metadata.column_count() != values.len() {
            return Err(DbError::invalid_input(format!(
                "Row has {} values for {} columns",
                values.len(),
                metadata.column_count()
            )));
        }
        Ok(Self {
            metadata,
            values,
            metadata_calls: AtomicUsize::new(0),
        })
    }

    /// How many times the metadata was requested.
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::Relaxed)
    }
}

impl RowCursor for MemoryRow {
    fn column_count(&self) -> usize {
        self.values.len()
    }

    fn metadata(&self) -> DbResult<ResultMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.metadata.clone())
    }

    fn column(&self, position: usize) -> Option<ColumnMetadata> {
        self.metadata.columns.get(position).cloned()
    }

    fn read(&self, position: usize) -> DbResult<Value> {
        self.values.get(position).cloned().ok_or_else(|| {
            DbError::invalid_input(format!(
                "Column position {} out of bounds (columns: {})",
                position,
                self.values.len()
            ))
        })
    }
}
