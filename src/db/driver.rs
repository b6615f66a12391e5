//! Native drivers and the driver registry.
//!
//! A [`NativeDriver`] answers connection strings by URL prefix and opens
//! [`NativeConnection`]s through sqlx. Drivers are registered once per
//! database kind in a [`DriverRegistry`]; providers consult the process-wide
//! registry before opening a facade.

use crate::error::{DbError, DbResult, NativeError, NativeOrigin};
use crate::impl_db_dispatch;
use crate::models::{ConnectionProperties, DatabaseKind, mask_connection_string};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::{debug, info};

/// An open native connection.
#[derive(Debug)]
pub enum NativeConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

impl NativeConnection {
    pub fn kind(&self) -> DatabaseKind {
        match self {
            NativeConnection::MySql(_) => DatabaseKind::MySQL,
            NativeConnection::Postgres(_) => DatabaseKind::PostgreSQL,
            NativeConnection::SQLite(_) => DatabaseKind::SQLite,
        }
    }

    /// Round-trip to the server.
    pub async fn ping(&mut self) -> Result<(), NativeError> {
        impl_db_dispatch!(self, {
            MySql(c) => c.ping().await,
            Postgres(c) => c.ping().await,
            SQLite(c) => c.ping().await,
        })
        .map_err(NativeError::from)
    }

    /// Close the connection gracefully.
    pub async fn close(self) -> Result<(), NativeError> {
        impl_db_dispatch!(self, {
            MySql(c) => c.close().await,
            Postgres(c) => c.close().await,
            SQLite(c) => c.close().await,
        })
        .map_err(NativeError::from)
    }
}

/// Version of the sqlx drivers this build links.
const SQLX_VERSION: &str = "0.8";

/// Native driver of one database kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeDriver {
    kind: DatabaseKind,
    prefixes: Vec<String>,
}

impl NativeDriver {
    /// Load the driver shipped for a kind. Kinds without a native driver in
    /// this build yield `None`.
    pub fn load(kind: DatabaseKind) -> Option<Self> {
        match kind {
            DatabaseKind::PostgreSQL | DatabaseKind::MySQL | DatabaseKind::SQLite => {
                Some(Self::with_prefixes(kind, kind.url_prefixes().iter().copied()))
            }
            DatabaseKind::Oracle => None,
        }
    }

    /// Driver for `kind` answering the given URL prefixes.
    pub fn with_prefixes<I, P>(kind: DatabaseKind, prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            kind,
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Name and version of the native client library, e.g. `sqlx-postgres 0.8`.
    pub fn version(&self) -> String {
        let library = match self.kind {
            DatabaseKind::PostgreSQL => "sqlx-postgres",
            DatabaseKind::MySQL => "sqlx-mysql",
            DatabaseKind::SQLite => "sqlx-sqlite",
            DatabaseKind::Oracle => "oracle",
        };
        format!("{} {}", library, SQLX_VERSION)
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Whether this driver answers the connection string.
    pub fn accepts(&self, connection_string: &str) -> bool {
        let lower = connection_string.trim_start().to_ascii_lowercase();
        self.prefixes
            .iter()
            .any(|p| lower.starts_with(&p.to_ascii_lowercase()))
    }

    /// Open a connection. The connection string is handed to sqlx unmodified;
    /// properties are applied on top of what it specifies.
    pub async fn connect(
        &self,
        connection_string: &str,
        properties: &ConnectionProperties,
    ) -> Result<NativeConnection, NativeError> {
        debug!(
            kind = %self.kind,
            connection_string = %mask_connection_string(connection_string),
            "Opening native connection"
        );
        match self.kind {
            DatabaseKind::PostgreSQL => {
                let mut options = PgConnectOptions::from_str(connection_string)?;
                if let Some(user) = properties.user() {
                    options = options.username(user);
                }
                if let Some(password) = properties.password() {
                    options = options.password(password);
                }
                if let Some(name) = properties.get(ConnectionProperties::APPLICATION_NAME) {
                    options = options.application_name(name);
                }
                Ok(NativeConnection::Postgres(options.connect().await?))
            }
            DatabaseKind::MySQL => {
                let mut options =
                    MySqlConnectOptions::from_str(connection_string)?.charset("utf8mb4");
                if let Some(user) = properties.user() {
                    options = options.username(user);
                }
                if let Some(password) = properties.password() {
                    options = options.password(password);
                }
                Ok(NativeConnection::MySql(options.connect().await?))
            }
            DatabaseKind::SQLite => {
                let mut options = SqliteConnectOptions::from_str(connection_string)?;
                if let Some(create) = properties.flag(ConnectionProperties::CREATE_IF_MISSING) {
                    options = options.create_if_missing(create);
                }
                Ok(NativeConnection::SQLite(options.connect().await?))
            }
            DatabaseKind::Oracle => Err(NativeError::with_origin(
                NativeOrigin::Configuration,
                "no native Oracle driver is available in this build",
            )),
        }
    }
}

/// Registered native drivers, at most one per database kind.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    drivers: Mutex<Vec<Arc<NativeDriver>>>,
}

static GLOBAL_REGISTRY: LazyLock<DriverRegistry> = LazyLock::new(DriverRegistry::new);

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL_REGISTRY
    }

    fn drivers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<NativeDriver>>> {
        self.drivers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a driver. Registering a kind that already has a driver is a
    /// no-op returning the registered one.
    pub fn register(&self, driver: NativeDriver) -> DbResult<Arc<NativeDriver>> {
        if driver.prefixes.is_empty() {
            return Err(DbError::initialization(format!(
                "Driver for {} answers no connection string",
                driver.kind
            )));
        }

        let mut drivers = self.drivers();
        if let Some(existing) = drivers.iter().find(|d| d.kind == driver.kind) {
            debug!(kind = %driver.kind, "Driver already registered");
            return Ok(Arc::clone(existing));
        }

        info!(kind = %driver.kind, prefixes = ?driver.prefixes, "Registered native driver");
        let driver = Arc::new(driver);
        drivers.push(Arc::clone(&driver));
        Ok(driver)
    }

    /// Whether some registered driver answers the connection string.
    pub fn accepts(&self, connection_string: &str) -> bool {
        self.drivers().iter().any(|d| d.accepts(connection_string))
    }

    /// The registered driver answering the connection string.
    pub fn driver_for(&self, connection_string: &str) -> Option<Arc<NativeDriver>> {
        self.drivers()
            .iter()
            .find(|d| d.accepts(connection_string))
            .cloned()
    }

    pub fn is_registered(&self, kind: DatabaseKind) -> bool {
        self.drivers().iter().any(|d| d.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.drivers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_drivers() {
        assert!(NativeDriver::load(DatabaseKind::PostgreSQL).is_some());
        assert!(NativeDriver::load(DatabaseKind::MySQL).is_some());
        assert!(NativeDriver::load(DatabaseKind::SQLite).is_some());
        assert!(NativeDriver::load(DatabaseKind::Oracle).is_none());
    }

    #[test]
    fn test_driver_accepts_by_prefix() {
        let pg = NativeDriver::load(DatabaseKind::PostgreSQL).unwrap();
        assert!(pg.accepts("postgres://localhost/db"));
        assert!(pg.accepts("PostgreSQL://localhost/db"));
        assert!(!pg.accepts("mysql://localhost/db"));

        let sqlite = NativeDriver::load(DatabaseKind::SQLite).unwrap();
        assert!(sqlite.accepts("sqlite::memory:"));
        assert!(sqlite.accepts("sqlite:///tmp/x.db"));
    }

    #[test]
    fn test_register_is_idempotent_per_kind() {
        let registry = DriverRegistry::new();
        let first = registry
            .register(NativeDriver::load(DatabaseKind::MySQL).unwrap())
            .unwrap();
        let second = registry
            .register(NativeDriver::with_prefixes(DatabaseKind::MySQL, ["other://"]))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert!(!registry.accepts("other://x"));
    }

    #[test]
    fn test_register_rejects_driver_without_prefixes() {
        let registry = DriverRegistry::new();
        let driver = NativeDriver::with_prefixes(DatabaseKind::SQLite, Vec::<String>::new());
        let err = registry.register(driver).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Initialization);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_driver_for_resolves_kind() {
        let registry = DriverRegistry::new();
        for kind in [DatabaseKind::PostgreSQL, DatabaseKind::SQLite] {
            registry.register(NativeDriver::load(kind).unwrap()).unwrap();
        }
        let d = registry.driver_for("sqlite::memory:").unwrap();
        assert_eq!(d.kind(), DatabaseKind::SQLite);
        assert!(registry.driver_for("mysql://localhost").is_none());
    }

    #[tokio::test]
    async fn test_connect_sqlite_in_memory() {
        let driver = NativeDriver::load(DatabaseKind::SQLite).unwrap();
        let mut conn = driver
            .connect("sqlite::memory:", &ConnectionProperties::new())
            .await
            .unwrap();
        assert_eq!(conn.kind(), DatabaseKind::SQLite);
        conn.ping().await.unwrap();
        conn.close().await.unwrap();
    }
}
