//! Integration tests for the connections limit.

mod common;

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

#[tokio::test]
async fn test_request_beyond_limit_waits_for_release() {
    let (facade, _dir) = common::sqlite_facade(2);
    facade.connect().await.unwrap();

    let first = facade.session().await.unwrap();
    let second = facade.session().await.unwrap();

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let waiter = {
        let facade = facade.clone();
        let events_tx = events_tx.clone();
        tokio::spawn(async move {
            let session = facade.session().await.unwrap();
            events_tx.send("third acquired").unwrap();
            release_rx.await.unwrap();
            drop(session);
        })
    };

    // the third request cannot complete while both sessions are out
    let pending = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(pending.is_err());

    events_tx.send("first released").unwrap();
    drop(first);

    assert_eq!(events.recv().await, Some("first released"));
    assert_eq!(events.recv().await, Some("third acquired"));

    release_tx.send(()).unwrap();
    waiter.await.unwrap();
    drop(second);
}

#[tokio::test]
async fn test_concurrent_sessions_share_limited_connections() {
    let (facade, _dir) = common::sqlite_with_users(3).await;

    let mut handles = Vec::new();
    for i in 0..12_i64 {
        let facade = facade.clone();
        handles.push(tokio::spawn(async move {
            let mut session = facade.session().await.unwrap();
            session
                .execute(
                    "INSERT INTO users (name, age) VALUES (?, ?)",
                    &[format!("user{}", i).into(), i.into()],
                )
                .await
        }));
    }
    let mut inserted = 0;
    for handle in handles {
        // SQLite may report a busy database under write contention
        if let Ok(rows) = handle.await.unwrap() {
            inserted += rows as i64;
        }
    }

    let mut session = facade.session().await.unwrap();
    let count: Option<i64> = session
        .query_scalar("SELECT COUNT(*) FROM users", &[])
        .await
        .unwrap();
    assert!(inserted > 0);
    assert_eq!(count, Some(inserted));
}

#[tokio::test]
async fn test_disconnect_fails_waiting_requests() {
    let (facade, _dir) = common::sqlite_facade(1);
    facade.connect().await.unwrap();
    let held = facade.session().await.unwrap();

    let waiter = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.session().await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let closer = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.disconnect().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(held);

    closer.await.unwrap().unwrap();
    let outcome = waiter.await.unwrap();
    // the waiter either got the connection before the drain or was refused
    if let Err(e) = outcome {
        assert_eq!(e.kind(), rdba::ErrorKind::NotConnected);
    }
    assert!(!facade.is_connected());
}
