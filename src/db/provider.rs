//! Providers.
//!
//! One [`Provider`] per database kind resolves the native driver and opens
//! [`Facade`]s. Opening a facade makes sure a driver answering the kind's
//! example connection string is registered (loading and registering it at
//! most once), resolves the driver for the requested connection string and
//! binds it, with the kind's recognizer, into a new facade.

use crate::db::driver::{DriverRegistry, NativeDriver};
use crate::db::facade::Facade;
use crate::db::recognizer::{
    ExceptionRecognizer, MySqlRecognizer, OracleRecognizer, PostgresRecognizer, SqliteRecognizer,
};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionProperties, DatabaseKind, mask_connection_string};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Factory of facades for one database kind.
pub trait Provider: Send + Sync + Debug {
    fn kind(&self) -> DatabaseKind;

    /// A connection string the kind's driver is known to answer.
    fn connection_string_example(&self) -> &'static str;

    /// Load the kind's native driver; `None` when it is not available.
    fn load_driver(&self) -> Option<NativeDriver> {
        NativeDriver::load(self.kind())
    }

    fn exception_recognizer(&self) -> Arc<dyn ExceptionRecognizer>;

    /// Open a facade using the process-wide driver registry.
    fn open_facade(
        &self,
        connection_string: &str,
        properties: ConnectionProperties,
        connections_limit: u32,
    ) -> DbResult<Facade> {
        self.open_facade_in(
            DriverRegistry::global(),
            connection_string,
            properties,
            connections_limit,
        )
    }

    /// Open a facade using the given driver registry.
    fn open_facade_in(
        &self,
        registry: &DriverRegistry,
        connection_string: &str,
        properties: ConnectionProperties,
        connections_limit: u32,
    ) -> DbResult<Facade> {
        if connections_limit == 0 {
            return Err(DbError::invalid_input(
                "Connections limit must be a positive integer",
            ));
        }

        let example = self.connection_string_example();
        if !registry.accepts(example) {
            let driver = self.load_driver().ok_or_else(|| {
                DbError::initialization(format!("{} driver not found", self.kind().display_name()))
            })?;
            registry.register(driver)?;
        }

        let driver = registry
            .driver_for(connection_string)
            .filter(|d| d.kind() == self.kind())
            .ok_or_else(|| {
                DbError::initialization(format!(
                    "No registered {} driver accepts connection string '{}'",
                    self.kind().display_name(),
                    mask_connection_string(connection_string)
                ))
            })?;

        debug!(
            kind = %self.kind(),
            connection_string = %mask_connection_string(connection_string),
            connections_limit,
            "Opening facade"
        );
        Facade::new(
            driver,
            connection_string,
            properties,
            connections_limit,
            self.exception_recognizer(),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresProvider;

impl Provider for PostgresProvider {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::PostgreSQL
    }

    fn connection_string_example(&self) -> &'static str {
        "postgres://localhost:5432/postgres"
    }

    fn exception_recognizer(&self) -> Arc<dyn ExceptionRecognizer> {
        Arc::new(PostgresRecognizer)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlProvider;

impl Provider for MySqlProvider {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySQL
    }

    fn connection_string_example(&self) -> &'static str {
        "mysql://localhost:3306/mysql"
    }

    fn exception_recognizer(&self) -> Arc<dyn ExceptionRecognizer> {
        Arc::new(MySqlRecognizer)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl Provider for SqliteProvider {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::SQLite
    }

    fn connection_string_example(&self) -> &'static str {
        "sqlite::memory:"
    }

    fn exception_recognizer(&self) -> Arc<dyn ExceptionRecognizer> {
        Arc::new(SqliteRecognizer)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleProvider;

impl Provider for OracleProvider {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Oracle
    }

    fn connection_string_example(&self) -> &'static str {
        "oracle://localhost:1521/XEPDB1"
    }

    fn exception_recognizer(&self) -> Arc<dyn ExceptionRecognizer> {
        Arc::new(OracleRecognizer)
    }
}

/// The provider of a database kind.
pub fn provider_for(kind: DatabaseKind) -> Arc<dyn Provider> {
    match kind {
        DatabaseKind::PostgreSQL => Arc::new(PostgresProvider),
        DatabaseKind::MySQL => Arc::new(MySqlProvider),
        DatabaseKind::SQLite => Arc::new(SqliteProvider),
        DatabaseKind::Oracle => Arc::new(OracleProvider),
    }
}

/// The provider whose kind the connection string's scheme names.
pub fn provider_for_connection_string(connection_string: &str) -> DbResult<Arc<dyn Provider>> {
    DatabaseKind::from_connection_string(connection_string)
        .map(provider_for)
        .ok_or_else(|| {
            DbError::invalid_input(format!(
                "Unsupported connection string '{}'. Expected one of: postgres://, mysql://, sqlite:, oracle://",
                mask_connection_string(connection_string)
            ))
        })
}
