//! Statement execution.
//!
//! # Architecture
//!
//! Execution dispatches on the [`NativeConnection`] variant into a
//! database-specific submodule:
//! - `mysql`: MySQL-specific query and write operations
//! - `postgres`: PostgreSQL-specific query and write operations
//! - `sqlite`: SQLite-specific query and write operations
//!
//! Rows are streamed from the driver and handed to a [`RowFetcher`] one at a
//! time, with one [`FetchState`] per result. Native failures are recognized
//! with the SQL text as context before they leave this module.

use crate::db::cursor::RowCursor;
use crate::db::driver::NativeConnection;
use crate::db::fetchers::{FetchState, RowFetcher};
use crate::db::recognizer::ExceptionRecognizer;
use crate::error::{DbResult, NativeError};
use crate::impl_db_dispatch;
use crate::models::Value;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use tracing::debug;

/// Run a query and fetch up to `limit` rows (all rows when `None`).
pub(crate) async fn fetch<F>(
    conn: &mut NativeConnection,
    sql: &str,
    params: &[Value],
    fetcher: &F,
    limit: Option<usize>,
    recognizer: &dyn ExceptionRecognizer,
) -> DbResult<Vec<F::Row>>
where
    F: RowFetcher + ?Sized,
{
    debug!(sql = %sql, params = params.len(), limit = ?limit, "Executing query");
    let rows = impl_db_dispatch!(conn, {
        MySql(c) => drain(mysql::fetch(c, sql, params), fetcher, limit, sql, recognizer).await,
        Postgres(c) => drain(postgres::fetch(c, sql, params), fetcher, limit, sql, recognizer).await,
        SQLite(c) => drain(sqlite::fetch(c, sql, params), fetcher, limit, sql, recognizer).await,
    })?;
    debug!(rows = rows.len(), "Query completed");
    Ok(rows)
}

/// Run a statement and return the number of affected rows.
pub(crate) async fn execute(
    conn: &mut NativeConnection,
    sql: &str,
    params: &[Value],
    recognizer: &dyn ExceptionRecognizer,
) -> DbResult<u64> {
    debug!(sql = %sql, params = params.len(), "Executing statement");
    let result = impl_db_dispatch!(conn, {
        MySql(c) => mysql::execute(c, sql, params).await,
        Postgres(c) => postgres::execute(c, sql, params).await,
        SQLite(c) => sqlite::execute(c, sql, params).await,
    });
    result.map_err(|e| recognizer.recognize(NativeError::from(e), sql))
}

// =============================================================================
// Common Helper Functions
// =============================================================================

async fn drain<R, F>(
    mut stream: BoxStream<'_, Result<R, sqlx::Error>>,
    fetcher: &F,
    limit: Option<usize>,
    sql: &str,
    recognizer: &dyn ExceptionRecognizer,
) -> DbResult<Vec<F::Row>>
where
    R: RowCursor,
    F: RowFetcher + ?Sized,
{
    let mut state = FetchState::new();
    let mut rows = Vec::new();
    while limit.is_none_or(|l| rows.len() < l) {
        let next = stream
            .try_next()
            .await
            .map_err(|e| recognizer.recognize(NativeError::from(e), sql))?;
        let Some(row) = next else {
            break;
        };
        rows.push(fetcher.fetch_row(&mut state, &row)?);
    }
    Ok(rows)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// Statements without parameters run unprepared, so that statements the
// server cannot prepare (DDL, procedures, several statements) still work.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::Executor;
    use sqlx::mysql::{MySqlConnection, MySqlRow};

    pub fn fetch<'c>(
        conn: &'c mut MySqlConnection,
        sql: &'c str,
        params: &'c [Value],
    ) -> BoxStream<'c, Result<MySqlRow, sqlx::Error>> {
        if params.is_empty() {
            return conn.fetch(sql);
        }
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        query.fetch(conn)
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[Value],
    ) -> Result<u64, sqlx::Error> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(conn).await?
        };
        Ok(result.rows_affected())
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::Executor;
    use sqlx::postgres::{PgConnection, PgRow};

    pub fn fetch<'c>(
        conn: &'c mut PgConnection,
        sql: &'c str,
        params: &'c [Value],
    ) -> BoxStream<'c, Result<PgRow, sqlx::Error>> {
        if params.is_empty() {
            return conn.fetch(sql);
        }
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_postgres_param(query, param);
        }
        query.fetch(conn)
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        params: &[Value],
    ) -> Result<u64, sqlx::Error> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(conn).await?
        };
        Ok(result.rows_affected())
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::Executor;
    use sqlx::sqlite::{SqliteConnection, SqliteRow};

    pub fn fetch<'c>(
        conn: &'c mut SqliteConnection,
        sql: &'c str,
        params: &'c [Value],
    ) -> BoxStream<'c, Result<SqliteRow, sqlx::Error>> {
        if params.is_empty() {
            return conn.fetch(sql);
        }
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        query.fetch(conn)
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Value],
    ) -> Result<u64, sqlx::Error> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(conn).await?
        };
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::driver::NativeDriver;
    use crate::db::fetchers::{ArrayFetcher, ScalarFetcher};
    use crate::db::recognizer::SqliteRecognizer;
    use crate::error::ErrorKind;
    use crate::models::{ConnectionProperties, DatabaseKind};

    async fn memory_connection() -> NativeConnection {
        NativeDriver::load(DatabaseKind::SQLite)
            .unwrap()
            .connect("sqlite::memory:", &ConnectionProperties::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_and_fetch() {
        let mut conn = memory_connection().await;
        let r = SqliteRecognizer;
        execute(&mut conn, "CREATE TABLE t (a INTEGER, b INTEGER)", &[], &r)
            .await
            .unwrap();
        let affected = execute(
            &mut conn,
            "INSERT INTO t VALUES (?, ?), (?, ?)",
            &[Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)],
            &r,
        )
        .await
        .unwrap();
        assert_eq!(affected, 2);

        let rows = fetch(
            &mut conn,
            "SELECT a, b FROM t ORDER BY a",
            &[],
            &ArrayFetcher::<i64>::new(0, 2),
            None,
            &r,
        )
        .await
        .unwrap();
        assert_eq!(rows, vec![vec![1, 2], vec![3, 4]]);
    }

    #[tokio::test]
    async fn test_fetch_respects_limit() {
        let mut conn = memory_connection().await;
        let r = SqliteRecognizer;
        let rows = fetch(
            &mut conn,
            "SELECT 1 UNION ALL SELECT 2 UNION ALL SELECT 3",
            &[],
            &ScalarFetcher::<i64>::new(0),
            Some(1),
            &r,
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_native_errors_are_recognized() {
        let mut conn = memory_connection().await;
        let err = execute(&mut conn, "SELEC 1", &[], &SqliteRecognizer)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }
}
