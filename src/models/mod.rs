//! Data models shared across the crate.
//!
//! This module re-exports all model types used throughout the library.

pub mod connection;
pub mod dialect;
pub mod query;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionProperties, DatabaseKind, mask_connection_string};
pub use dialect::{PlaceholderStyle, SqlDialect, Version};
pub use query::{ColumnMetadata, ResultMetadata};
pub use value::{
    DATE_FORMAT, FromValue, TIME_FORMAT, TIMESTAMP_FORMAT, Value, ValueType,
};
