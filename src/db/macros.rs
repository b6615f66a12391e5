//! Declarative macros for native dispatch and record schemas.
//!
//! The macros expand at compile time: dispatch keeps one readable match per
//! operation instead of three copies, and `record_type!` generates the field
//! setter closures a [`RecordType`](crate::db::RecordType) needs.

/// Generate match arms over the [`NativeConnection`](crate::db::NativeConnection)
/// variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::execute(c, sql, params).await,
///     Postgres(c) => postgres::execute(c, sql, params).await,
///     SQLite(c) => sqlite::execute(c, sql, params).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::driver::NativeConnection::$variant($c) => $body,
            )+
        }
    };
}

/// Build a [`RecordType`](crate::db::RecordType) for a `Default` struct from
/// its field list.
///
/// ```
/// use rdba::record_type;
/// use rdba::models::ValueType;
///
/// #[derive(Default)]
/// struct Account {
///     id: i64,
///     owner: Option<String>,
/// }
///
/// let schema = record_type!(Account { id: i64, owner: Option<String> });
/// assert_eq!(schema.name(), "Account");
/// assert_eq!(schema.fields()[1].value_type(), ValueType::String);
/// ```
#[macro_export]
macro_rules! record_type {
    ($ty:ty { $($field:ident : $fty:ty),* $(,)? }) => {
        $crate::db::RecordType::<$ty>::new(stringify!($ty))
            .constructor(<$ty as ::std::default::Default>::default)
            $(
                .field::<$fty, _>(stringify!($field), |record: &mut $ty, value: $fty| {
                    record.$field = value;
                })
            )*
    };
}
