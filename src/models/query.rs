//! Result metadata models.

use crate::models::DatabaseKind;
use serde::{Deserialize, Serialize};

/// Column metadata as reported by the native driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Native type name, e.g. `INT4`, `VARCHAR`, `DATETIME`.
    pub native_type: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
        }
    }
}

/// Shape of one query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub kind: DatabaseKind,
    pub columns: Vec<ColumnMetadata>,
}

impl ResultMetadata {
    pub fn new(kind: DatabaseKind, columns: Vec<ColumnMetadata>) -> Self {
        Self { kind, columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Zero-based position of a column, matched case-insensitively.
    /// The first column wins when names repeat.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}
