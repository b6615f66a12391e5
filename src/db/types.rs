//! Native type mapping and value getters.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. A per-kind lookup table maps the native type name a driver reports
//!    (`INT4`, `VARCHAR`, `DATETIME`, ...) to exactly one [`ValueType`].
//! 2. A [`ValueGetter`] bound to a (native type, target type) pair reads the
//!    column from a [`RowCursor`] and converts it to the target type.
//!
//! Getter selection is validated when a result shape is bound; range and
//! precision checks happen when a value is read.

use crate::db::cursor::RowCursor;
use crate::error::{DbError, DbResult};
use crate::models::{
    DATE_FORMAT, DatabaseKind, TIME_FORMAT, TIMESTAMP_FORMAT, Value, ValueType,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

// =============================================================================
// Native Type Tables
// =============================================================================

const POSTGRES_TYPES: &[(&str, ValueType)] = &[
    ("BOOL", ValueType::Boolean),
    ("\"CHAR\"", ValueType::Byte),
    ("INT2", ValueType::Short),
    ("INT4", ValueType::Int),
    ("OID", ValueType::Long),
    ("INT8", ValueType::Long),
    ("FLOAT4", ValueType::Float),
    ("FLOAT8", ValueType::Double),
    ("NUMERIC", ValueType::Decimal),
    ("TEXT", ValueType::String),
    ("VARCHAR", ValueType::String),
    ("CHAR", ValueType::String),
    ("BPCHAR", ValueType::String),
    ("NAME", ValueType::String),
    ("DATE", ValueType::Date),
    ("TIME", ValueType::Time),
    ("TIMESTAMP", ValueType::Timestamp),
    ("TIMESTAMPTZ", ValueType::Timestamp),
    ("TIMETZ", ValueType::Time),
    // read as their canonical text
    ("UUID", ValueType::String),
    ("JSON", ValueType::String),
    ("JSONB", ValueType::String),
    ("INTERVAL", ValueType::String),
    ("UNKNOWN", ValueType::String),
    // always NULL
    ("VOID", ValueType::String),
];

const MYSQL_TYPES: &[(&str, ValueType)] = &[
    ("BOOLEAN", ValueType::Boolean),
    ("TINYINT", ValueType::Byte),
    ("SMALLINT", ValueType::Short),
    ("MEDIUMINT", ValueType::Int),
    ("INT", ValueType::Int),
    ("BIGINT", ValueType::Long),
    ("TINYINT UNSIGNED", ValueType::Short),
    ("SMALLINT UNSIGNED", ValueType::Int),
    ("MEDIUMINT UNSIGNED", ValueType::Int),
    ("INT UNSIGNED", ValueType::Long),
    ("BIGINT UNSIGNED", ValueType::Decimal),
    ("YEAR", ValueType::Short),
    ("FLOAT", ValueType::Float),
    ("DOUBLE", ValueType::Double),
    ("DECIMAL", ValueType::Decimal),
    ("BIT", ValueType::Long),
    ("CHAR", ValueType::String),
    ("VARCHAR", ValueType::String),
    ("TINYTEXT", ValueType::String),
    ("TEXT", ValueType::String),
    ("MEDIUMTEXT", ValueType::String),
    ("LONGTEXT", ValueType::String),
    ("ENUM", ValueType::String),
    ("SET", ValueType::String),
    ("JSON", ValueType::String),
    // the type of a bare NULL literal
    ("NULL", ValueType::String),
    ("DATE", ValueType::Date),
    ("TIME", ValueType::Time),
    ("DATETIME", ValueType::Timestamp),
    ("TIMESTAMP", ValueType::Timestamp),
];

// SQLite reports declared column types; expression columns report the storage
// class of their value, where NULL carries no type of its own.
const SQLITE_TYPES: &[(&str, ValueType)] = &[
    ("BOOLEAN", ValueType::Boolean),
    ("INTEGER", ValueType::Long),
    ("REAL", ValueType::Double),
    ("NUMERIC", ValueType::Double),
    ("TEXT", ValueType::String),
    ("NULL", ValueType::String),
    ("DATE", ValueType::Date),
    ("TIME", ValueType::Time),
    ("DATETIME", ValueType::Timestamp),
];

const ORACLE_TYPES: &[(&str, ValueType)] = &[
    ("NUMBER", ValueType::Decimal),
    ("BINARY_FLOAT", ValueType::Float),
    ("BINARY_DOUBLE", ValueType::Double),
    ("FLOAT", ValueType::Double),
    ("CHAR", ValueType::String),
    ("NCHAR", ValueType::String),
    ("VARCHAR2", ValueType::String),
    ("NVARCHAR2", ValueType::String),
    ("CLOB", ValueType::String),
    ("NCLOB", ValueType::String),
    ("LONG", ValueType::String),
    ("DATE", ValueType::Timestamp),
    ("TIMESTAMP", ValueType::Timestamp),
];

/// The native type table of a database kind.
pub fn native_types(kind: DatabaseKind) -> &'static [(&'static str, ValueType)] {
    match kind {
        DatabaseKind::PostgreSQL => POSTGRES_TYPES,
        DatabaseKind::MySQL => MYSQL_TYPES,
        DatabaseKind::SQLite => SQLITE_TYPES,
        DatabaseKind::Oracle => ORACLE_TYPES,
    }
}

/// Look up the value type of a native type name (case-insensitive).
pub fn value_type_of(kind: DatabaseKind, native_type: &str) -> Option<ValueType> {
    native_types(kind)
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(native_type))
        .map(|(_, vt)| *vt)
}

/// Like [`value_type_of`], failing for unmapped native types.
pub fn require_value_type(kind: DatabaseKind, native_type: &str) -> DbResult<ValueType> {
    value_type_of(kind, native_type).ok_or_else(|| {
        DbError::initialization(format!(
            "Native type '{}' of {} is not mapped to a value type",
            native_type, kind
        ))
    })
}

// =============================================================================
// Getter Selection
// =============================================================================

/// Whether a column of type `native` can ever be read as `target`.
pub fn is_convertible(native: ValueType, target: ValueType) -> bool {
    use ValueType::*;

    if native == target || native == String || target == String {
        return true;
    }
    match target {
        Boolean => native.is_integer(),
        Byte | Short | Int | Long => native.is_numeric() || native == Boolean,
        Float | Double | Decimal => native.is_numeric(),
        Date | Time => native == Timestamp,
        Timestamp => native == Date,
        String => true,
    }
}

/// Reads one column and converts it to a target value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueGetter {
    native: Option<ValueType>,
    target: ValueType,
    column: Option<String>,
}

impl ValueGetter {
    /// Getter for a column whose native type is known.
    pub fn new(native: ValueType, target: ValueType) -> Self {
        Self {
            native: Some(native),
            target,
            column: None,
        }
    }

    /// Getter that accepts whatever the column holds and converts it.
    pub fn to(target: ValueType) -> Self {
        Self {
            native: None,
            target,
            column: None,
        }
    }

    /// Label the column in conversion errors.
    pub fn for_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn native(&self) -> Option<ValueType> {
        self.native
    }

    pub fn target(&self) -> ValueType {
        self.target
    }

    /// Read the column at `position` and convert it to the target type.
    /// SQL NULL stays [`Value::Null`].
    pub fn get_value(&self, cursor: &dyn RowCursor, position: usize) -> DbResult<Value> {
        let raw = cursor.read(position)?;
        convert(raw, self.target).map_err(|failure| {
            let described = cursor.column(position);
            let column = self
                .column
                .clone()
                .or_else(|| described.as_ref().map(|c| c.name.clone()))
                .unwrap_or_else(|| format!("#{}", position));
            let native = described
                .map(|c| c.native_type)
                .or_else(|| self.native.map(|n| n.name().to_string()))
                .unwrap_or_else(|| failure.source_type.to_string());
            DbError::conversion(column, native, failure.message)
        })
    }
}

/// Select the getter for a native column type and a target type.
///
/// Fails with an initialization error for unmapped native types and with a
/// conversion error when the pair can never convert.
pub fn select_getter(
    kind: DatabaseKind,
    native_type: &str,
    target: ValueType,
) -> DbResult<ValueGetter> {
    let native = require_value_type(kind, native_type)?;
    if !is_convertible(native, target) {
        return Err(DbError::conversion(
            "(binding)",
            native_type,
            format!("a {} column cannot be read as {}", native, target),
        ));
    }
    Ok(ValueGetter::new(native, target))
}

// =============================================================================
// Conversion
// =============================================================================

/// Why a value could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionFailure {
    pub source_type: &'static str,
    pub message: String,
}

impl ConversionFailure {
    fn new(value: &Value, target: ValueType, reason: impl std::fmt::Display) -> Self {
        let text = value.to_text().unwrap_or_default();
        Self {
            source_type: value.type_name(),
            message: format!("cannot read '{}' as {}: {}", text, target, reason),
        }
    }
}

/// Convert a value to the target type.
///
/// Widening always succeeds; narrowing succeeds only when the value fits.
/// Floating point targets accept precision loss.
pub fn convert(value: Value, target: ValueType) -> Result<Value, ConversionFailure> {
    if value.is_null() || value.value_type() == Some(target) {
        return Ok(value);
    }
    match target {
        ValueType::String => Ok(Value::String(value.to_text().unwrap_or_default())),
        ValueType::Boolean => to_boolean(&value).map(Value::Boolean),
        ValueType::Byte => to_integer(&value, target).and_then(|v| {
            i8::try_from(v)
                .map(Value::Byte)
                .map_err(|_| ConversionFailure::new(&value, target, "out of range"))
        }),
        ValueType::Short => to_integer(&value, target).and_then(|v| {
            i16::try_from(v)
                .map(Value::Short)
                .map_err(|_| ConversionFailure::new(&value, target, "out of range"))
        }),
        ValueType::Int => to_integer(&value, target).and_then(|v| {
            i32::try_from(v)
                .map(Value::Int)
                .map_err(|_| ConversionFailure::new(&value, target, "out of range"))
        }),
        ValueType::Long => to_integer(&value, target).map(Value::Long),
        ValueType::Float => {
            let v = to_double(&value, target)?;
            let f = v as f32;
            if v.is_finite() && !f.is_finite() {
                return Err(ConversionFailure::new(&value, target, "out of range"));
            }
            Ok(Value::Float(f))
        }
        ValueType::Double => to_double(&value, target).map(Value::Double),
        ValueType::Decimal => to_decimal(&value, target).map(Value::Decimal),
        ValueType::Date => match &value {
            Value::Timestamp(ts) => Ok(Value::Date(ts.date())),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| ConversionFailure::new(&value, target, e)),
            _ => Err(ConversionFailure::new(&value, target, "incompatible types")),
        },
        ValueType::Time => match &value {
            Value::Timestamp(ts) => Ok(Value::Time(ts.time())),
            Value::String(s) => NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
                .map(Value::Time)
                .map_err(|e| ConversionFailure::new(&value, target, e)),
            _ => Err(ConversionFailure::new(&value, target, "incompatible types")),
        },
        ValueType::Timestamp => match &value {
            Value::Date(d) => Ok(Value::Timestamp(d.and_time(NaiveTime::MIN))),
            Value::String(s) => NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
                .map(Value::Timestamp)
                .map_err(|e| ConversionFailure::new(&value, target, e)),
            _ => Err(ConversionFailure::new(&value, target, "incompatible types")),
        },
    }
}

fn to_boolean(value: &Value) -> Result<bool, ConversionFailure> {
    match value {
        Value::Byte(v) => Ok(*v != 0),
        Value::Short(v) => Ok(*v != 0),
        Value::Int(v) => Ok(*v != 0),
        Value::Long(v) => Ok(*v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConversionFailure::new(value, ValueType::Boolean, "not a boolean")),
        },
        _ => Err(ConversionFailure::new(
            value,
            ValueType::Boolean,
            "incompatible types",
        )),
    }
}

fn to_integer(value: &Value, target: ValueType) -> Result<i64, ConversionFailure> {
    match value {
        Value::Boolean(v) => Ok(i64::from(*v)),
        Value::Byte(v) => Ok(i64::from(*v)),
        Value::Short(v) => Ok(i64::from(*v)),
        Value::Int(v) => Ok(i64::from(*v)),
        Value::Long(v) => Ok(*v),
        Value::Float(v) => float_to_integer(f64::from(*v), value, target),
        Value::Double(v) => float_to_integer(*v, value, target),
        Value::Decimal(d) => {
            if !d.fract().is_zero() {
                return Err(ConversionFailure::new(value, target, "has a fractional part"));
            }
            d.to_i64()
                .ok_or_else(|| ConversionFailure::new(value, target, "out of range"))
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| ConversionFailure::new(value, target, e)),
        _ => Err(ConversionFailure::new(value, target, "incompatible types")),
    }
}

fn float_to_integer(v: f64, value: &Value, target: ValueType) -> Result<i64, ConversionFailure> {
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(ConversionFailure::new(value, target, "not an integral number"));
    }
    // i64::MAX is not representable as f64; 2^63 is the first value beyond range.
    if v < -9_223_372_036_854_775_808.0 || v >= 9_223_372_036_854_775_808.0 {
        return Err(ConversionFailure::new(value, target, "out of range"));
    }
    Ok(v as i64)
}

fn to_double(value: &Value, target: ValueType) -> Result<f64, ConversionFailure> {
    match value {
        Value::Byte(v) => Ok(f64::from(*v)),
        Value::Short(v) => Ok(f64::from(*v)),
        Value::Int(v) => Ok(f64::from(*v)),
        Value::Long(v) => Ok(*v as f64),
        Value::Float(v) => Ok(f64::from(*v)),
        Value::Double(v) => Ok(*v),
        Value::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| ConversionFailure::new(value, target, "out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| ConversionFailure::new(value, target, e)),
        _ => Err(ConversionFailure::new(value, target, "incompatible types")),
    }
}

fn to_decimal(value: &Value, target: ValueType) -> Result<Decimal, ConversionFailure> {
    let out_of_range = || ConversionFailure::new(value, target, "not representable as decimal");
    match value {
        Value::Byte(v) => Ok(Decimal::from(*v)),
        Value::Short(v) => Ok(Decimal::from(*v)),
        Value::Int(v) => Ok(Decimal::from(*v)),
        Value::Long(v) => Ok(Decimal::from(*v)),
        Value::Float(v) => Decimal::from_f32(*v).ok_or_else(out_of_range),
        Value::Double(v) => Decimal::from_f64(*v).ok_or_else(out_of_range),
        Value::String(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|e| ConversionFailure::new(value, target, e)),
        _ => Err(ConversionFailure::new(value, target, "incompatible types")),
    }
}
