//! Sessions and transactions.
//!
//! A [`Session`] owns one leased connection for the duration of a unit of
//! work. Dropping the session returns the connection to the pool. A session
//! dropped with a transaction still open discards its connection, so an
//! unfinished transaction never leaks into another session.

use crate::db::executor;
use crate::db::fetchers::{RowFetcher, ScalarFetcher};
use crate::db::pool::Lease;
use crate::db::recognizer::ExceptionRecognizer;
use crate::error::{DbError, DbResult, ErrorKind};
use crate::models::{FromValue, SqlDialect, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Session {
    lease: Lease,
    dialect: SqlDialect,
    recognizer: Arc<dyn ExceptionRecognizer>,
    transaction_open: bool,
}

impl Session {
    pub(crate) fn new(
        lease: Lease,
        dialect: SqlDialect,
        recognizer: Arc<dyn ExceptionRecognizer>,
    ) -> Self {
        Self {
            lease,
            dialect,
            recognizer,
            transaction_open: false,
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Whether a transaction is open on this session.
    pub fn is_in_transaction(&self) -> bool {
        self.transaction_open
    }

    /// Run a query and materialize every row with `fetcher`.
    pub async fn query<F>(&mut self, sql: &str, params: &[Value], fetcher: &F) -> DbResult<Vec<F::Row>>
    where
        F: RowFetcher + ?Sized,
    {
        self.fetch(sql, params, fetcher, None).await
    }

    /// Run a query and materialize its first row, if any.
    pub async fn query_optional<F>(
        &mut self,
        sql: &str,
        params: &[Value],
        fetcher: &F,
    ) -> DbResult<Option<F::Row>>
    where
        F: RowFetcher + ?Sized,
    {
        let rows = self.fetch(sql, params, fetcher, Some(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// First column of the first row. `None` when the result is empty.
    pub async fn query_scalar<V: FromValue>(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Option<V>> {
        self.query_optional(sql, params, &ScalarFetcher::<V>::new(0))
            .await
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<u64> {
        let recognizer = Arc::clone(&self.recognizer);
        let result = {
            let conn = self.lease.connection()?;
            executor::execute(conn, sql, params, recognizer.as_ref()).await
        };
        self.observe(result)
    }

    async fn fetch<F>(
        &mut self,
        sql: &str,
        params: &[Value],
        fetcher: &F,
        limit: Option<usize>,
    ) -> DbResult<Vec<F::Row>>
    where
        F: RowFetcher + ?Sized,
    {
        let recognizer = Arc::clone(&self.recognizer);
        let result = {
            let conn = self.lease.connection()?;
            executor::fetch(conn, sql, params, fetcher, limit, recognizer.as_ref()).await
        };
        self.observe(result)
    }

    /// A connection that failed with a connectivity error is not reused.
    fn observe<T>(&mut self, result: DbResult<T>) -> DbResult<T> {
        match &result {
            Err(e) if e.kind() == ErrorKind::Connectivity => {
                debug!(error = %e, "Connection lost, discarding it");
                self.lease.mark_broken();
            }
            _ => {}
        }
        result
    }

    /// Run `op` inside a transaction on this session.
    ///
    /// Commits when `op` succeeds. When `op` or the commit fails, rolls back
    /// and returns the original error; a rollback failure is attached to it.
    pub async fn in_transaction<R, F>(&mut self, op: F) -> DbResult<R>
    where
        F: AsyncFnOnce(&mut Session) -> DbResult<R>,
    {
        self.begin().await?;
        let outcome = match op(self).await {
            Ok(value) => self.commit().await.map(|()| value),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(value) => Ok(value),
            Err(primary) => Err(self.rollback_after(primary).await),
        }
    }

    pub(crate) async fn begin(&mut self) -> DbResult<()> {
        if self.transaction_open {
            return Err(DbError::invalid_input(
                "A transaction is already open on this session",
            ));
        }
        if let Some(statement) = self.dialect.begin_statement() {
            self.execute(statement, &[]).await?;
        }
        self.transaction_open = true;
        debug!(dialect = %self.dialect.name(), "Transaction started");
        Ok(())
    }

    pub(crate) async fn commit(&mut self) -> DbResult<()> {
        self.execute("COMMIT", &[]).await?;
        self.transaction_open = false;
        debug!("Transaction committed");
        Ok(())
    }

    pub(crate) async fn rollback(&mut self) -> DbResult<()> {
        let result = self.execute("ROLLBACK", &[]).await;
        self.transaction_open = false;
        match result {
            Ok(_) => {
                debug!("Transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.lease.mark_broken();
                Err(e)
            }
        }
    }

    async fn rollback_after(&mut self, primary: DbError) -> DbError {
        match self.rollback().await {
            Ok(()) => primary,
            Err(rollback) => {
                warn!(error = %primary, rollback_error = %rollback, "Rollback failed");
                primary.with_rollback_failure(rollback)
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.dialect)
            .field("transaction_open", &self.transaction_open)
            .field("lease", &self.lease)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transaction_open {
            warn!("Session dropped with an open transaction, discarding its connection");
            self.lease.mark_broken();
        }
    }
}
