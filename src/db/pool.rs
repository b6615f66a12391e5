//! Bounded connection pool.
//!
//! A facade owns one [`ConnectionPool`]. At most `limit` connections are
//! leased at a time; a lease request waits while all of them are out. Idle
//! connections are reused, and new ones are opened through the native driver
//! on demand. Every lease is a [`Lease`] guard that hands its connection back
//! when dropped, unless the connection was marked broken.

use crate::db::driver::{NativeConnection, NativeDriver};
use crate::db::recognizer::ExceptionRecognizer;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionProperties, DatabaseKind, mask_connection_string};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

pub struct ConnectionPool {
    driver: Arc<NativeDriver>,
    connection_string: String,
    properties: ConnectionProperties,
    limit: u32,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<NativeConnection>>,
    recognizer: Arc<dyn ExceptionRecognizer>,
    opened: AtomicUsize,
}

impl ConnectionPool {
    /// Create an empty pool. No connection is opened until the first lease.
    pub fn new(
        driver: Arc<NativeDriver>,
        connection_string: impl Into<String>,
        properties: ConnectionProperties,
        limit: u32,
        recognizer: Arc<dyn ExceptionRecognizer>,
    ) -> DbResult<Self> {
        if limit == 0 || limit as usize > Semaphore::MAX_PERMITS {
            return Err(DbError::invalid_input(format!(
                "Connections limit must be between 1 and {}, got {}",
                Semaphore::MAX_PERMITS,
                limit
            )));
        }
        Ok(Self {
            driver,
            connection_string: connection_string.into(),
            properties,
            limit,
            permits: Arc::new(Semaphore::new(limit as usize)),
            idle: Mutex::new(Vec::new()),
            recognizer,
            opened: AtomicUsize::new(0),
        })
    }

    pub fn kind(&self) -> DatabaseKind {
        self.driver.kind()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Connections currently leased.
    pub fn leased(&self) -> usize {
        (self.limit as usize).saturating_sub(self.permits.available_permits())
    }

    pub fn idle_count(&self) -> usize {
        self.idle().len()
    }

    /// Connections opened over the pool's lifetime.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    fn idle(&self) -> MutexGuard<'_, Vec<NativeConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn target(&self) -> String {
        format!(
            "{} ({})",
            self.kind().display_name(),
            mask_connection_string(&self.connection_string)
        )
    }

    /// Lease one connection, waiting while the pool is exhausted.
    pub async fn lease(self: &Arc<Self>) -> DbResult<Lease> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DbError::not_connected(self.target()))?;

        let reused = self.idle().pop();
        let connection = match reused {
            Some(conn) => conn,
            None => self.open().await?,
        };

        debug!(kind = %self.kind(), leased = self.leased(), "Leased connection");
        Ok(Lease {
            connection: Some(connection),
            pool: Arc::clone(self),
            broken: false,
            _permit: permit,
        })
    }

    async fn open(&self) -> DbResult<NativeConnection> {
        let conn = self
            .driver
            .connect(&self.connection_string, &self.properties)
            .await
            .map_err(|e| self.recognizer.recognize(e, "connect"))?;
        let total = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(kind = %self.kind(), opened = total, "Opened connection");
        Ok(conn)
    }

    /// Wait until every lease is released, then close idle connections.
    /// Lease requests made afterwards fail with a not-connected error.
    /// Returns the first close failure after attempting every connection.
    pub async fn drain(&self) -> DbResult<()> {
        let all = match self.permits.acquire_many(self.limit).await {
            Ok(permits) => permits,
            Err(_) => return Ok(()),
        };
        self.permits.close();
        drop(all);

        let connections: Vec<NativeConnection> = std::mem::take(&mut *self.idle());
        let count = connections.len();
        let mut first_error = None;
        for conn in connections {
            if let Err(e) = conn.close().await {
                warn!(kind = %self.kind(), error = %e, "Failed to close connection");
                first_error.get_or_insert(self.recognizer.recognize(e, "disconnect"));
            }
        }
        info!(kind = %self.kind(), closed = count, "Connection pool drained");
        first_error.map_or(Ok(()), Err)
    }

    fn give_back(&self, connection: NativeConnection) {
        if self.is_closed() {
            return;
        }
        self.idle().push(connection);
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("kind", &self.kind())
            .field(
                "connection_string",
                &mask_connection_string(&self.connection_string),
            )
            .field("limit", &self.limit)
            .field("leased", &self.leased())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// RAII guard for one leased connection.
///
/// The connection goes back to the pool when the guard is dropped, before the
/// lease slot is freed. A connection marked broken is dropped instead.
pub struct Lease {
    connection: Option<NativeConnection>,
    pool: Arc<ConnectionPool>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl Lease {
    pub fn connection(&mut self) -> DbResult<&mut NativeConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| DbError::connectivity("Connection was discarded", "lease"))
    }

    /// Discard the connection instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("kind", &self.pool.kind())
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.broken {
            debug!(kind = %self.pool.kind(), "Discarding broken connection");
            return;
        }
        self.pool.give_back(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::recognizer::recognizer_for;
    use std::time::Duration;

    fn sqlite_pool(limit: u32) -> Arc<ConnectionPool> {
        let driver = Arc::new(NativeDriver::load(DatabaseKind::SQLite).unwrap());
        Arc::new(
            ConnectionPool::new(
                driver,
                "sqlite::memory:",
                ConnectionProperties::new(),
                limit,
                recognizer_for(DatabaseKind::SQLite),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_zero_limit_rejected() {
        let driver = Arc::new(NativeDriver::load(DatabaseKind::SQLite).unwrap());
        let result = ConnectionPool::new(
            driver,
            "sqlite::memory:",
            ConnectionProperties::new(),
            0,
            recognizer_for(DatabaseKind::SQLite),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lease_reuses_idle_connection() {
        let pool = sqlite_pool(2);
        {
            let _lease = pool.lease().await.unwrap();
            assert_eq!(pool.leased(), 1);
        }
        assert_eq!(pool.leased(), 0);
        assert_eq!(pool.idle_count(), 1);
        let _again = pool.lease().await.unwrap();
        assert_eq!(pool.opened_count(), 1);
    }

    #[tokio::test]
    async fn test_broken_connection_is_discarded() {
        let pool = sqlite_pool(1);
        let mut lease = pool.lease().await.unwrap();
        lease.mark_broken();
        drop(lease);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.leased(), 0);
    }

    #[tokio::test]
    async fn test_lease_waits_when_exhausted() {
        let pool = sqlite_pool(1);
        let held = pool.lease().await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.lease()).await;
        assert!(waiting.is_err());
        drop(held);
        let _next = pool.lease().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_closes_pool() {
        let pool = sqlite_pool(2);
        drop(pool.lease().await.unwrap());
        pool.drain().await.unwrap();
        assert!(pool.is_closed());
        assert_eq!(pool.idle_count(), 0);
        let err = pool.lease().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotConnected);
        // draining twice is harmless
        pool.drain().await.unwrap();
    }
}
