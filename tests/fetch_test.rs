//! Integration tests for row fetchers over real SQLite results.

mod common;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rdba::db::{ArrayFetcher, ScalarFetcher, StructFetcher};
use rdba::models::{Value, ValueType};
use rdba::{ErrorKind, record_type};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Default, PartialEq)]
struct User {
    id: i64,
    name: String,
    age: Option<i32>,
    score: f64,
    unknown_field: i32,
}

async fn seed(facade: &rdba::Facade) {
    facade
        .in_session(async |s| {
            s.execute(
                "INSERT INTO users (name, age, score) VALUES (?, ?, ?), (?, ?, ?)",
                &[
                    Value::from("ada"),
                    Value::from(36_i32),
                    Value::from(9.5_f64),
                    Value::from("grace"),
                    Value::Null,
                    Value::Null,
                ],
            )
            .await
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_struct_fetcher_maps_named_columns() {
    let (facade, _dir) = common::sqlite_with_users(1).await;
    seed(&facade).await;

    let schema = record_type!(User {
        id: i64,
        name: String,
        age: Option<i32>,
        score: f64,
        unknown_field: i32,
    });
    let fetcher = StructFetcher::from_record(Arc::new(schema)).unwrap();

    let users = facade
        .in_session(async |s| {
            s.query("SELECT * FROM users ORDER BY id", &[], &fetcher)
                .await
        })
        .await
        .unwrap();

    assert_eq!(
        users,
        vec![
            User {
                id: 1,
                name: "ada".to_string(),
                age: Some(36),
                score: 9.5,
                unknown_field: 0,
            },
            User {
                id: 2,
                name: "grace".to_string(),
                age: None,
                score: 0.0,
                unknown_field: 0,
            },
        ]
    );
}

#[tokio::test]
async fn test_struct_fetcher_matches_columns_case_insensitively() {
    let (facade, _dir) = common::sqlite_with_users(1).await;
    seed(&facade).await;

    let schema = record_type!(User { id: i64, name: String });
    let fetcher = StructFetcher::new(
        Arc::new(schema),
        [("id", ValueType::Long), ("name", ValueType::String)],
    )
    .unwrap();

    let first = facade
        .in_session(async |s| {
            s.query_optional(
                "SELECT id AS Id, UPPER(name) AS NAME FROM users ORDER BY id",
                &[],
                &fetcher,
            )
            .await
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.id, 1);
    assert_eq!(first.name, "ADA");
}

#[tokio::test]
async fn test_array_fetcher_reads_consecutive_columns_as_text() {
    let (facade, _dir) = common::sqlite_with_users(1).await;
    seed(&facade).await;

    let rows = facade
        .in_session(async |s| {
            s.query(
                "SELECT id, name, age FROM users ORDER BY id",
                &[],
                &ArrayFetcher::<Option<String>>::new(1, 2),
            )
            .await
        })
        .await
        .unwrap();

    assert_eq!(
        rows,
        vec![
            vec![Some("ada".to_string()), Some("36".to_string())],
            vec![Some("grace".to_string()), None],
        ]
    );
}

#[tokio::test]
async fn test_scalar_null_into_plain_type_is_conversion_error() {
    let (facade, _dir) = common::sqlite_with_users(1).await;
    seed(&facade).await;

    let err = facade
        .in_session(async |s| {
            s.query_scalar::<i32>("SELECT age FROM users WHERE name = 'grace'", &[])
                .await
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
}

#[tokio::test]
async fn test_empty_result_yields_no_rows() {
    let (facade, _dir) = common::sqlite_with_users(1).await;

    let none: Option<String> = facade
        .in_session(async |s| s.query_scalar("SELECT name FROM users", &[]).await)
        .await
        .unwrap();
    assert!(none.is_none());

    let all = facade
        .in_session(async |s| {
            s.query("SELECT id FROM users", &[], &ScalarFetcher::<i64>::new(0))
                .await
        })
        .await
        .unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_typed_columns_keep_their_values() {
    let (facade, _dir) = common::sqlite_facade(1);
    facade.connect().await.unwrap();

    let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let time = NaiveTime::from_hms_opt(13, 5, 9).unwrap();
    let stamp: NaiveDateTime = date.and_time(time);

    facade
        .in_session(async |s| {
            s.execute(
                "CREATE TABLE typed (flag BOOLEAN, d DATE, t TIME, ts DATETIME, amount NUMERIC, label TEXT, \
                 tiny TINYINT, small SMALLINT, ratio FLOAT)",
                &[],
            )
            .await?;
            s.execute(
                "INSERT INTO typed VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                &[
                    Value::from(true),
                    Value::from(date),
                    Value::from(time),
                    Value::from(stamp),
                    Value::from(Decimal::new(1250, 2)),
                    Value::from("2024-02-29"),
                    Value::Byte(-12),
                    Value::Short(1234),
                    Value::Float(1.25),
                ],
            )
            .await
        })
        .await
        .unwrap();

    let mut session = facade.session().await.unwrap();
    let flag: Option<bool> = session.query_scalar("SELECT flag FROM typed", &[]).await.unwrap();
    let d: Option<NaiveDate> = session.query_scalar("SELECT d FROM typed", &[]).await.unwrap();
    let t: Option<NaiveTime> = session.query_scalar("SELECT t FROM typed", &[]).await.unwrap();
    let ts: Option<NaiveDateTime> = session.query_scalar("SELECT ts FROM typed", &[]).await.unwrap();
    let amount: Option<Decimal> = session
        .query_scalar("SELECT amount FROM typed", &[])
        .await
        .unwrap();
    // text parsed into a date on read
    let parsed: Option<NaiveDate> = session
        .query_scalar("SELECT label FROM typed", &[])
        .await
        .unwrap();
    let tiny: Option<i8> = session.query_scalar("SELECT tiny FROM typed", &[]).await.unwrap();
    let small: Option<i16> = session.query_scalar("SELECT small FROM typed", &[]).await.unwrap();
    let ratio: Option<f32> = session.query_scalar("SELECT ratio FROM typed", &[]).await.unwrap();

    assert_eq!(flag, Some(true));
    assert_eq!(d, Some(date));
    assert_eq!(t, Some(time));
    assert_eq!(ts, Some(stamp));
    assert_eq!(amount, Some(Decimal::new(125, 1)));
    assert_eq!(parsed, Some(date));
    assert_eq!(tiny, Some(-12));
    assert_eq!(small, Some(1234));
    assert_eq!(ratio, Some(1.25));
}

#[tokio::test]
async fn test_unparsable_text_is_conversion_error() {
    let (facade, _dir) = common::sqlite_with_users(1).await;
    seed(&facade).await;

    let err = facade
        .in_session(async |s| {
            s.query_scalar::<NaiveDate>("SELECT name FROM users WHERE id = 1", &[])
                .await
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(err.suggestion().is_some());
    let message = err.to_string();
    assert!(message.contains("column name (TEXT)"), "{}", message);
    assert!(message.contains("'ada'"), "{}", message);
}

#[tokio::test]
async fn test_out_of_range_narrowing_is_conversion_error() {
    let (facade, _dir) = common::sqlite_with_users(1).await;
    facade
        .in_session(async |s| {
            s.execute(
                "INSERT INTO users (name, age) VALUES (?, ?)",
                &[Value::from("old"), Value::from(300_i32)],
            )
            .await
        })
        .await
        .unwrap();

    let err = facade
        .in_session(async |s| s.query_scalar::<i8>("SELECT age FROM users", &[]).await)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(err.to_string().contains("column age"), "{}", err);
}
