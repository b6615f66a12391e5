//! Shared helpers for integration tests.

#![allow(dead_code)]

use rdba::db::{Provider, SqliteProvider};
use rdba::models::ConnectionProperties;
use rdba::Facade;
use std::sync::Once;
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Install a test subscriber once. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A file-backed SQLite facade. Keep the returned directory alive for the
/// duration of the test; every pooled connection sees the same file.
pub fn sqlite_facade(limit: u32) -> (Facade, TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let connection_string = format!("sqlite://{}", path.display());
    let properties = ConnectionProperties::new().with(ConnectionProperties::CREATE_IF_MISSING, "true");
    let facade = SqliteProvider
        .open_facade(&connection_string, properties, limit)
        .unwrap();
    (facade, dir)
}

/// A connected SQLite facade with a `users` table.
pub async fn sqlite_with_users(limit: u32) -> (Facade, TempDir) {
    let (facade, dir) = sqlite_facade(limit);
    facade.connect().await.unwrap();
    facade
        .in_session(async |s| {
            s.execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, age INTEGER, score REAL)",
                &[],
            )
            .await
        })
        .await
        .unwrap();
    (facade, dir)
}

/// Read an environment-provided URL or print why the test is skipped.
pub fn env_url(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: {} not set", var);
            None
        }
    }
}
