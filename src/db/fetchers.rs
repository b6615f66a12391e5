//! Row fetchers.
//!
//! A fetcher materializes one result row into a scalar, an array or a record.
//! Fetchers are immutable declarations and can be reused by many queries; the
//! per-result column binding lives in a [`FetchState`] that every traversal
//! creates fresh and that a fetcher writes at most once, on the first row.

use crate::db::cursor::RowCursor;
use crate::db::record::RecordType;
use crate::db::types::{ValueGetter, select_getter};
use crate::error::{DbError, DbResult};
use crate::models::{FromValue, Value, ValueType};
use std::marker::PhantomData;
use std::sync::Arc;

/// Strategy turning the current row of a cursor into a `Row`.
pub trait RowFetcher: Send + Sync {
    type Row: Send;

    fn fetch_row(&self, state: &mut FetchState, cursor: &dyn RowCursor) -> DbResult<Self::Row>;
}

impl<F: RowFetcher + ?Sized> RowFetcher for &F {
    type Row = F::Row;

    fn fetch_row(&self, state: &mut FetchState, cursor: &dyn RowCursor) -> DbResult<Self::Row> {
        (**self).fetch_row(state, cursor)
    }
}

/// Column binding resolved from result metadata.
#[derive(Debug, Clone)]
struct ColumnBinding {
    position: usize,
    getter: ValueGetter,
}

/// Per-traversal state of a fetcher.
#[derive(Debug, Default)]
pub struct FetchState {
    bindings: Option<Vec<Option<ColumnBinding>>>,
}

impl FetchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fetcher has bound columns for this traversal.
    pub fn is_bound(&self) -> bool {
        self.bindings.is_some()
    }
}

/// Fetch every row of an in-memory result with one traversal state.
pub fn fetch_rows<F, C>(fetcher: &F, rows: &[C]) -> DbResult<Vec<F::Row>>
where
    F: RowFetcher + ?Sized,
    C: RowCursor,
{
    let mut state = FetchState::new();
    rows.iter()
        .map(|row| fetcher.fetch_row(&mut state, row))
        .collect()
}

/// Name of the column at `position`, or `#position` when the cursor has none.
fn column_label(cursor: &dyn RowCursor, position: usize) -> String {
    cursor
        .column(position)
        .map(|c| c.name)
        .unwrap_or_else(|| format!("#{}", position))
}

fn take<V: FromValue>(value: Value, column: impl FnOnce() -> String) -> DbResult<V> {
    V::from_value(value).map_err(|rejected| {
        let message = if rejected.is_null() {
            format!("NULL cannot be read as {}; fetch an Option instead", V::VALUE_TYPE)
        } else {
            format!("expected {}", V::VALUE_TYPE)
        };
        DbError::conversion(column(), rejected.type_name(), message)
    })
}

// =============================================================================
// Scalar Fetcher
// =============================================================================

/// Reads one column at a fixed position.
#[derive(Debug, Clone)]
pub struct ScalarFetcher<V> {
    position: usize,
    getter: ValueGetter,
    _marker: PhantomData<fn() -> V>,
}

impl<V: FromValue> ScalarFetcher<V> {
    pub fn new(position: usize) -> Self {
        Self {
            position,
            getter: ValueGetter::to(V::VALUE_TYPE),
            _marker: PhantomData,
        }
    }

    /// Use an explicit getter; its target must be the kind of `V`.
    pub fn with_getter(position: usize, getter: ValueGetter) -> DbResult<Self> {
        if getter.target() != V::VALUE_TYPE {
            return Err(DbError::initialization(format!(
                "Getter produces {} but the scalar is {}",
                getter.target(),
                V::VALUE_TYPE
            )));
        }
        Ok(Self {
            position,
            getter,
            _marker: PhantomData,
        })
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl<V: FromValue> RowFetcher for ScalarFetcher<V> {
    type Row = V;

    fn fetch_row(&self, _state: &mut FetchState, cursor: &dyn RowCursor) -> DbResult<V> {
        let value = self.getter.get_value(cursor, self.position)?;
        take(value, || column_label(cursor, self.position))
    }
}

// =============================================================================
// Array Fetcher
// =============================================================================

/// Reads consecutive columns into a `Vec` of one element type.
#[derive(Debug, Clone)]
pub struct ArrayFetcher<V> {
    start: usize,
    getters: Vec<ValueGetter>,
    _marker: PhantomData<fn() -> V>,
}

impl<V: FromValue> ArrayFetcher<V> {
    /// `len` columns starting at `start`.
    pub fn new(start: usize, len: usize) -> Self {
        Self {
            start,
            getters: vec![ValueGetter::to(V::VALUE_TYPE); len],
            _marker: PhantomData,
        }
    }

    /// One getter per slot. Slots may read different native kinds but every
    /// getter must produce the element kind.
    pub fn with_getters(start: usize, getters: Vec<ValueGetter>) -> DbResult<Self> {
        if let Some((slot, g)) = getters
            .iter()
            .enumerate()
            .find(|(_, g)| g.target() != V::VALUE_TYPE)
        {
            return Err(DbError::initialization(format!(
                "Getter for slot {} produces {} but the elements are {}",
                slot,
                g.target(),
                V::VALUE_TYPE
            )));
        }
        Ok(Self {
            start,
            getters,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.getters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.getters.is_empty()
    }
}

impl<V: FromValue> RowFetcher for ArrayFetcher<V> {
    type Row = Vec<V>;

    fn fetch_row(&self, _state: &mut FetchState, cursor: &dyn RowCursor) -> DbResult<Vec<V>> {
        self.getters
            .iter()
            .enumerate()
            .map(|(slot, getter)| {
                let position = self.start + slot;
                let value = getter.get_value(cursor, position)?;
                take(value, || column_label(cursor, position))
            })
            .collect()
    }
}

// =============================================================================
// Struct Fetcher
// =============================================================================

/// A declared (name, type) component and the record field it feeds.
#[derive(Debug, Clone)]
struct Component {
    name: String,
    value_type: ValueType,
    field: Option<usize>,
}

/// Builds a record per row from named columns.
///
/// Components are resolved against the record fields at construction. Column
/// positions and getters are resolved against the result metadata on the
/// first row of a traversal and reused for the rest of it. A component with
/// no field, or with no column in the result, is skipped; SQL NULL leaves the
/// field at its constructed value.
pub struct StructFetcher<S> {
    record: Arc<RecordType<S>>,
    constructor: fn() -> S,
    components: Vec<Component>,
}

impl<S: Send + 'static> StructFetcher<S> {
    pub fn new<I, N>(record: Arc<RecordType<S>>, components: I) -> DbResult<Self>
    where
        I: IntoIterator<Item = (N, ValueType)>,
        N: Into<String>,
    {
        let constructor = record.require_constructor()?;
        let components = components
            .into_iter()
            .map(|(name, value_type)| {
                let name = name.into();
                let field = record.field_index(&name);
                if let Some(index) = field {
                    let declared = record.fields()[index].value_type();
                    if declared != value_type {
                        return Err(DbError::initialization(format!(
                            "Component '{}' is {} but field {}.{} is {}",
                            name,
                            value_type,
                            record.name(),
                            name,
                            declared
                        )));
                    }
                }
                Ok(Component {
                    name,
                    value_type,
                    field,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(Self {
            record,
            constructor,
            components,
        })
    }

    /// One component per record field.
    pub fn from_record(record: Arc<RecordType<S>>) -> DbResult<Self> {
        let components: Vec<(String, ValueType)> = record
            .fields()
            .iter()
            .map(|f| (f.name().to_string(), f.value_type()))
            .collect();
        Self::new(record, components)
    }

    pub fn record(&self) -> &RecordType<S> {
        &self.record
    }

    /// Names of declared components that match no field.
    pub fn unresolved_components(&self) -> Vec<&str> {
        self.components
            .iter()
            .filter(|c| c.field.is_none())
            .map(|c| c.name.as_str())
            .collect()
    }

    fn bind(&self, cursor: &dyn RowCursor) -> DbResult<Vec<Option<ColumnBinding>>> {
        let metadata = cursor.metadata()?;
        self.components
            .iter()
            .map(|component| {
                if component.field.is_none() {
                    return Ok(None);
                }
                let Some(position) = metadata.position_of(&component.name) else {
                    return Ok(None);
                };
                let native_type = &metadata.columns[position].native_type;
                let getter = select_getter(metadata.kind, native_type, component.value_type)
                    .map_err(|e| match e {
                        DbError::Conversion {
                            native_type,
                            message,
                            ..
                        } => DbError::conversion(component.name.clone(), native_type, message),
                        other => other,
                    })?
                    .for_column(metadata.columns[position].name.clone());
                Ok(Some(ColumnBinding { position, getter }))
            })
            .collect()
    }
}

impl<S: Send + 'static> RowFetcher for StructFetcher<S> {
    type Row = S;

    fn fetch_row(&self, state: &mut FetchState, cursor: &dyn RowCursor) -> DbResult<S> {
        if state.bindings.is_none() {
            state.bindings = Some(self.bind(cursor)?);
        }
        let bindings = state.bindings.as_deref().unwrap_or_default();

        let mut record = (self.constructor)();
        for (component, binding) in self.components.iter().zip(bindings) {
            let (Some(field), Some(binding)) = (component.field, binding) else {
                continue;
            };
            let value = binding.getter.get_value(cursor, binding.position)?;
            if !value.is_null() {
                self.record.fields()[field].assign(&mut record, value)?;
            }
        }
        Ok(record)
    }
}

impl<S> std::fmt::Debug for StructFetcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructFetcher")
            .field("record", &self.record.name())
            .field("components", &self.components)
            .finish()
    }
}
