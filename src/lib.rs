//! Typed query execution and row mapping over PostgreSQL, MySQL/MariaDB and
//! SQLite (Oracle errors and dialect are recognized; no Oracle driver ships).
//!
//! Open a [`Facade`](db::Facade) through a provider or a [`FacadeConfig`],
//! connect it, and run work in sessions or transactions. Rows come back as
//! scalars, arrays or caller-defined records through
//! [`RowFetcher`](db::RowFetcher)s, and every native error is recognized into
//! one portable [`ErrorKind`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::FacadeConfig;
pub use db::{Facade, Session};
pub use error::{DbError, DbResult, ErrorKind};
