//! Parameter binding utilities for database queries.
//!
//! This module provides functions to bind [`Value`] parameters to
//! database-specific query objects.

use crate::models::Value;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Encode, MySql, Postgres, Sqlite, Type};

/// A PostgreSQL NULL parameter of unspecified type (OID 0), so the server
/// infers its type from the statement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q Value,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Boolean(v) => query.bind(*v),
        Value::Byte(v) => query.bind(*v),
        Value::Short(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Long(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        Value::Null => query.bind(UntypedNull),
        Value::Boolean(v) => query.bind(*v),
        // PostgreSQL has no one-byte integer outside of "char"
        Value::Byte(v) => query.bind(i16::from(*v)),
        Value::Short(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Long(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Double(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q Value,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Boolean(v) => query.bind(*v),
        Value::Byte(v) => query.bind(i32::from(*v)),
        Value::Short(v) => query.bind(i32::from(*v)),
        Value::Int(v) => query.bind(*v),
        Value::Long(v) => query.bind(*v),
        Value::Float(v) => query.bind(f64::from(*v)),
        Value::Double(v) => query.bind(*v),
        // SQLite has no decimal type, store the exact text
        Value::Decimal(v) => query.bind(v.to_string()),
        Value::String(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
    }
}
