//! Declarative record schemas.
//!
//! A [`RecordType`] describes how to build a caller-defined struct from named
//! columns: a zero-argument constructor plus one typed setter per field. The
//! record type itself implements nothing from this crate. Use the builder, or
//! the [`record_type!`](crate::record_type) macro for `Default` structs.

use crate::error::{DbError, DbResult};
use crate::models::{FromValue, Value, ValueType};

type Setter<S> = Box<dyn Fn(&mut S, Value) -> Result<(), Value> + Send + Sync>;

/// One settable field of a record.
pub struct FieldSetter<S> {
    name: String,
    value_type: ValueType,
    set: Setter<S>,
}

impl<S> FieldSetter<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Assign a value of the field's kind.
    pub fn assign(&self, record: &mut S, value: Value) -> DbResult<()> {
        (self.set)(record, value).map_err(|rejected| {
            DbError::conversion(
                self.name.clone(),
                rejected.type_name(),
                format!("field expects {}", self.value_type),
            )
        })
    }
}

impl<S> std::fmt::Debug for FieldSetter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSetter")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .finish()
    }
}

/// Schema of a record type `S`.
pub struct RecordType<S> {
    name: String,
    constructor: Option<fn() -> S>,
    fields: Vec<FieldSetter<S>>,
}

impl<S> RecordType<S> {
    /// Start a schema with no constructor and no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constructor: None,
            fields: Vec::new(),
        }
    }

    pub fn constructor(mut self, constructor: fn() -> S) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Declare a field. `V` decides the field's value type; `Option<T>` fields
    /// have the value type of `T`.
    pub fn field<V, F>(mut self, name: impl Into<String>, set: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut S, V) + Send + Sync + 'static,
    {
        let setter: Setter<S> = Box::new(move |record, value| {
            let v = V::from_value(value)?;
            set(record, v);
            Ok(())
        });
        self.fields.push(FieldSetter {
            name: name.into(),
            value_type: V::VALUE_TYPE,
            set: setter,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSetter<S>] {
        &self.fields
    }

    /// Index of the field with exactly this name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The zero-argument constructor, or an initialization error.
    pub fn require_constructor(&self) -> DbResult<fn() -> S> {
        self.constructor.ok_or_else(|| {
            DbError::initialization(format!(
                "Record type '{}' has no zero-argument constructor",
                self.name
            ))
        })
    }
}

impl<S: Default> RecordType<S> {
    /// Schema constructed with `S::default`.
    pub fn with_default(name: impl Into<String>) -> Self {
        Self::new(name).constructor(S::default)
    }
}

impl<S> std::fmt::Debug for RecordType<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name)
            .field("has_constructor", &self.constructor.is_some())
            .field("fields", &self.fields)
            .finish()
    }
}
