//! Database facade.
//!
//! A [`Facade`] is the per-database handle: it connects, disconnects and
//! hands out sessions. States are `Disconnected` and `Connected`; connecting
//! and reconnecting happen under the state write lock, so nobody observes a
//! half-connected facade.
//!
//! # Disconnect policy
//!
//! `disconnect` waits until every outstanding session has been released, then
//! closes the pooled connections. Session requests issued while a disconnect
//! is in progress, or after it, fail with a not-connected error. A task that
//! holds a session must drop it before it disconnects the same facade.

use crate::db::driver::NativeDriver;
use crate::db::fetchers::ScalarFetcher;
use crate::db::pool::ConnectionPool;
use crate::db::recognizer::ExceptionRecognizer;
use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionProperties, DatabaseKind, SqlDialect, Version, mask_connection_string,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum FacadeState {
    Disconnected,
    Connected(Arc<ConnectionPool>),
}

struct FacadeInner {
    driver: Arc<NativeDriver>,
    connection_string: String,
    properties: ConnectionProperties,
    connections_limit: u32,
    recognizer: Arc<dyn ExceptionRecognizer>,
    state: RwLock<FacadeState>,
    connected: AtomicBool,
    version: OnceLock<Version>,
}

/// Handle to one target database. Clones share the same pool and state.
#[derive(Clone)]
pub struct Facade {
    inner: Arc<FacadeInner>,
}

impl Facade {
    pub(crate) fn new(
        driver: Arc<NativeDriver>,
        connection_string: impl Into<String>,
        properties: ConnectionProperties,
        connections_limit: u32,
        recognizer: Arc<dyn ExceptionRecognizer>,
    ) -> DbResult<Self> {
        if connections_limit == 0 {
            return Err(DbError::invalid_input(
                "Connections limit must be a positive integer",
            ));
        }
        Ok(Self {
            inner: Arc::new(FacadeInner {
                driver,
                connection_string: connection_string.into(),
                properties,
                connections_limit,
                recognizer,
                state: RwLock::new(FacadeState::Disconnected),
                connected: AtomicBool::new(false),
                version: OnceLock::new(),
            }),
        })
    }

    pub fn kind(&self) -> DatabaseKind {
        self.inner.driver.kind()
    }

    pub fn connections_limit(&self) -> u32 {
        self.inner.connections_limit
    }

    /// The connection string with its password masked.
    pub fn masked_connection_string(&self) -> String {
        mask_connection_string(&self.inner.connection_string)
    }

    /// Last known connection status. Performs no round-trip.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Version of the native driver behind this facade. Needs no connection.
    pub fn driver_version(&self) -> String {
        self.inner.driver.version()
    }

    /// Server version read on the first successful connect.
    pub fn server_version(&self) -> Option<Version> {
        self.inner.version.get().copied()
    }

    /// The dialect, carrying the server version once known.
    pub fn dialect(&self) -> SqlDialect {
        match self.server_version() {
            Some(version) => SqlDialect::with_version(self.kind(), version),
            None => SqlDialect::new(self.kind()),
        }
    }

    fn not_connected(&self) -> DbError {
        DbError::not_connected(format!(
            "{} ({})",
            self.kind().display_name(),
            self.masked_connection_string()
        ))
    }

    /// Connect. Does nothing when already connected.
    pub async fn connect(&self) -> DbResult<()> {
        let mut state = self.inner.state.write().await;
        self.connect_locked(&mut state).await
    }

    /// Disconnect. Does nothing when not connected.
    pub async fn disconnect(&self) -> DbResult<()> {
        let mut state = self.inner.state.write().await;
        self.disconnect_locked(&mut state).await
    }

    /// Disconnect then connect, as one transition.
    pub async fn reconnect(&self) -> DbResult<()> {
        let mut state = self.inner.state.write().await;
        info!(kind = %self.kind(), "Reconnecting");
        self.disconnect_locked(&mut state).await?;
        self.connect_locked(&mut state).await
    }

    async fn connect_locked(&self, state: &mut FacadeState) -> DbResult<()> {
        if matches!(state, FacadeState::Connected(_)) {
            debug!(kind = %self.kind(), "Already connected");
            return Ok(());
        }

        info!(
            kind = %self.kind(),
            connection_string = %self.masked_connection_string(),
            connections_limit = self.inner.connections_limit,
            "Connecting to database"
        );

        let pool = Arc::new(ConnectionPool::new(
            Arc::clone(&self.inner.driver),
            self.inner.connection_string.clone(),
            self.inner.properties.clone(),
            self.inner.connections_limit,
            Arc::clone(&self.inner.recognizer),
        )?);

        // Opening the first connection validates the target.
        let mut session = Session::new(
            pool.lease().await?,
            self.dialect(),
            Arc::clone(&self.inner.recognizer),
        );
        if self.inner.version.get().is_none() {
            self.read_server_version(&mut session).await?;
        }
        drop(session);

        *state = FacadeState::Connected(pool);
        self.inner.connected.store(true, Ordering::Release);
        info!(
            kind = %self.kind(),
            server_version = ?self.server_version(),
            "Connected successfully"
        );
        Ok(())
    }

    async fn read_server_version(&self, session: &mut Session) -> DbResult<()> {
        let query = session.dialect().version_query();
        let banner = session
            .query_optional(query, &[], &ScalarFetcher::<Option<String>>::new(0))
            .await?
            .flatten();
        match banner.as_deref().and_then(Version::parse) {
            Some(version) => {
                self.inner.version.get_or_init(|| version);
                debug!(kind = %self.kind(), version = %version, "Got server version");
            }
            None => warn!(kind = %self.kind(), banner = ?banner, "Unrecognized server version"),
        }
        Ok(())
    }

    async fn disconnect_locked(&self, state: &mut FacadeState) -> DbResult<()> {
        let FacadeState::Connected(pool) = std::mem::replace(state, FacadeState::Disconnected)
        else {
            debug!(kind = %self.kind(), "Already disconnected");
            return Ok(());
        };
        self.inner.connected.store(false, Ordering::Release);
        info!(kind = %self.kind(), leased = pool.leased(), "Disconnecting");
        pool.drain().await?;
        info!(kind = %self.kind(), "Disconnected");
        Ok(())
    }

    /// Lease a session. Waits while all connections are leased.
    pub async fn session(&self) -> DbResult<Session> {
        let pool = {
            let state = self.inner.state.read().await;
            match &*state {
                FacadeState::Connected(pool) => Arc::clone(pool),
                FacadeState::Disconnected => return Err(self.not_connected()),
            }
        };
        let lease = pool.lease().await?;
        Ok(Session::new(
            lease,
            self.dialect(),
            Arc::clone(&self.inner.recognizer),
        ))
    }

    /// Run `op` with a session. The connection is released however `op` ends.
    pub async fn in_session<R, F>(&self, op: F) -> DbResult<R>
    where
        F: AsyncFnOnce(&mut Session) -> DbResult<R>,
    {
        let mut session = self.session().await?;
        op(&mut session).await
    }

    /// Run `op` with a session inside a transaction.
    ///
    /// Commits when `op` succeeds; otherwise rolls back and returns the
    /// original error with any rollback failure attached.
    pub async fn in_transaction<R, F>(&self, op: F) -> DbResult<R>
    where
        F: AsyncFnOnce(&mut Session) -> DbResult<R>,
    {
        let mut session = self.session().await?;
        session.in_transaction(op).await
    }
}

impl std::fmt::Debug for Facade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facade")
            .field("kind", &self.kind())
            .field("connection_string", &self.masked_connection_string())
            .field("connections_limit", &self.inner.connections_limit)
            .field("connected", &self.is_connected())
            .field("server_version", &self.server_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::recognizer::recognizer_for;
    use crate::error::ErrorKind;

    fn memory_facade(limit: u32) -> Facade {
        Facade::new(
            Arc::new(NativeDriver::load(DatabaseKind::SQLite).unwrap()),
            "sqlite::memory:",
            ConnectionProperties::new(),
            limit,
            recognizer_for(DatabaseKind::SQLite),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_session_requires_connect() {
        let facade = memory_facade(1);
        let err = facade.session().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_connect_reads_version_once() {
        let facade = memory_facade(1);
        assert!(facade.server_version().is_none());
        facade.connect().await.unwrap();
        let version = facade.server_version().unwrap();
        assert!(version.major >= 3);
        assert_eq!(facade.dialect().version(), Some(version));
        facade.reconnect().await.unwrap();
        assert_eq!(facade.server_version(), Some(version));
    }

    async fn current_pool(facade: &Facade) -> Option<Arc<ConnectionPool>> {
        match &*facade.inner.state.read().await {
            FacadeState::Connected(pool) => Some(Arc::clone(pool)),
            FacadeState::Disconnected => None,
        }
    }

    #[tokio::test]
    async fn test_second_connect_allocates_nothing() {
        let facade = memory_facade(2);
        facade.connect().await.unwrap();
        let first = current_pool(&facade).await.unwrap();
        facade.connect().await.unwrap();
        let second = current_pool(&facade).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.opened_count(), 1);
        assert!(facade.is_connected());

        facade.disconnect().await.unwrap();
        assert!(current_pool(&facade).await.is_none());
        assert!(first.is_closed());
    }

    #[tokio::test]
    async fn test_disconnect_never_connected_is_noop() {
        let facade = memory_facade(1);
        facade.disconnect().await.unwrap();
        assert!(!facade.is_connected());
    }

    #[tokio::test]
    async fn test_in_session_query_scalar() {
        let facade = memory_facade(1);
        facade.connect().await.unwrap();
        let v: Option<i64> = facade
            .in_session(async |s| s.query_scalar("SELECT 40 + 2", &[]).await)
            .await
            .unwrap();
        assert_eq!(v, Some(42));
    }

    #[test]
    fn test_driver_version_needs_no_connection() {
        let facade = memory_facade(1);
        assert_eq!(facade.driver_version(), "sqlx-sqlite 0.8");
        assert!(!facade.is_connected());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let result = Facade::new(
            Arc::new(NativeDriver::load(DatabaseKind::SQLite).unwrap()),
            "sqlite::memory:",
            ConnectionProperties::new(),
            0,
            recognizer_for(DatabaseKind::SQLite),
        );
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
