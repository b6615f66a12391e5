//! Portable value types.
//!
//! [`ValueType`] is the closed set of semantic column types every native type
//! is mapped to. [`Value`] carries one such value (or SQL NULL), and
//! [`FromValue`] extracts plain Rust values from it.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical text format of [`ValueType::Date`].
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Canonical text format of [`ValueType::Time`].
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
/// Canonical text format of [`ValueType::Timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Portable semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    String,
    Date,
    Time,
    Timestamp,
}

impl ValueType {
    pub const ALL: [ValueType; 12] = [
        ValueType::Boolean,
        ValueType::Byte,
        ValueType::Short,
        ValueType::Int,
        ValueType::Long,
        ValueType::Float,
        ValueType::Double,
        ValueType::Decimal,
        ValueType::String,
        ValueType::Date,
        ValueType::Time,
        ValueType::Timestamp,
    ];

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, Self::Float | Self::Double | Self::Decimal)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::Timestamp)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value's semantic type; `None` for NULL.
    pub fn value_type(&self) -> Option<ValueType> {
        Some(match self {
            Self::Null => return None,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Byte(_) => ValueType::Byte,
            Self::Short(_) => ValueType::Short,
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
            Self::Decimal(_) => ValueType::Decimal,
            Self::String(_) => ValueType::String,
            Self::Date(_) => ValueType::Date,
            Self::Time(_) => ValueType::Time,
            Self::Timestamp(_) => ValueType::Timestamp,
        })
    }

    /// Get the type name of this value for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.value_type().map(|t| t.name()).unwrap_or("null")
    }

    /// Render the value in its canonical text form.
    pub fn to_text(&self) -> Option<String> {
        Some(match self {
            Self::Null => return None,
            Self::Boolean(v) => v.to_string(),
            Self::Byte(v) => v.to_string(),
            Self::Short(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Long(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Decimal(v) => v.to_string(),
            Self::String(v) => v.clone(),
            Self::Date(v) => v.format(DATE_FORMAT).to_string(),
            Self::Time(v) => v.format(TIME_FORMAT).to_string(),
            Self::Timestamp(v) => v.format(TIMESTAMP_FORMAT).to_string(),
        })
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

impl_value_from!(
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Rust types that can be taken out of a [`Value`] of one fixed kind.
pub trait FromValue: Sized + Send + 'static {
    /// The kind a getter must produce for this type.
    const VALUE_TYPE: ValueType;

    /// Extract the value; gives the input back when it has another kind.
    fn from_value(value: Value) -> Result<Self, Value>;
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl FromValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn from_value(value: Value) -> Result<Self, Value> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

impl_from_value!(
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
);

impl<T: FromValue> FromValue for Option<T> {
    const VALUE_TYPE: ValueType = T::VALUE_TYPE;

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
