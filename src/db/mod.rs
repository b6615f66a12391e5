//! Database access layer.
//!
//! This module provides:
//! - Native type tables, value getters and conversions
//! - Row cursors and row fetchers (scalar, array, record)
//! - Exception recognizers per database kind
//! - Native drivers, the driver registry and providers
//! - The bounded connection pool, sessions and the facade
//! - Database dispatch and record schema macros

pub mod cursor;
pub mod driver;
mod executor;
pub mod facade;
pub mod fetchers;
pub mod macros;
mod params;
pub mod pool;
pub mod provider;
pub mod recognizer;
pub mod record;
pub mod session;
pub mod types;

pub use cursor::{MemoryRow, RowCursor};
pub use driver::{DriverRegistry, NativeConnection, NativeDriver};
pub use facade::Facade;
pub use fetchers::{ArrayFetcher, FetchState, RowFetcher, ScalarFetcher, StructFetcher, fetch_rows};
pub use pool::{ConnectionPool, Lease};
pub use provider::{
    MySqlProvider, OracleProvider, PostgresProvider, Provider, SqliteProvider, provider_for,
    provider_for_connection_string,
};
pub use recognizer::{
    ExceptionRecognizer, MySqlRecognizer, OracleRecognizer, PostgresRecognizer, SqliteRecognizer,
    recognizer_for,
};
pub use record::{FieldSetter, RecordType};
pub use session::Session;
pub use types::{ValueGetter, convert, native_types, select_getter, value_type_of};
