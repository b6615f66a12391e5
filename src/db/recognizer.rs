//! Exception recognizers.
//!
//! Every native error crossing into this crate is classified by the
//! recognizer of its database kind into one portable [`ErrorKind`].
//! Classification looks at the error origin first (socket, TLS, pool timeout,
//! decode), then at the vendor code or SQLSTATE the server reported.
//! Recognizers are stateless and total: anything unknown is `Unexpected`.

use crate::error::{DbError, ErrorKind, NativeError, NativeOrigin};
use crate::models::DatabaseKind;
use std::fmt::Debug;
use std::sync::Arc;

/// Classifier of the native errors of one database kind.
pub trait ExceptionRecognizer: Send + Sync + Debug {
    fn kind(&self) -> DatabaseKind;

    /// Classify a server-reported error (origin [`NativeOrigin::Database`]).
    fn classify_database(&self, native: &NativeError) -> ErrorKind;

    /// Portable kind of a native error. The context label plays no part.
    fn classify(&self, native: &NativeError) -> ErrorKind {
        match native.origin {
            NativeOrigin::Io | NativeOrigin::Tls | NativeOrigin::Protocol => ErrorKind::Connectivity,
            NativeOrigin::PoolTimeout => ErrorKind::Timeout,
            NativeOrigin::Configuration => ErrorKind::Initialization,
            NativeOrigin::Decode => ErrorKind::Conversion,
            NativeOrigin::Database => self.classify_database(native),
            NativeOrigin::Other => ErrorKind::Unexpected,
        }
    }

    /// Turn a native error into the portable error, keeping it as the cause.
    fn recognize(&self, native: NativeError, context: &str) -> DbError {
        let kind = self.classify(&native);
        DbError::from_native(kind, native, context)
    }
}

/// The recognizer of a database kind.
pub fn recognizer_for(kind: DatabaseKind) -> Arc<dyn ExceptionRecognizer> {
    match kind {
        DatabaseKind::PostgreSQL => Arc::new(PostgresRecognizer),
        DatabaseKind::MySQL => Arc::new(MySqlRecognizer),
        DatabaseKind::SQLite => Arc::new(SqliteRecognizer),
        DatabaseKind::Oracle => Arc::new(OracleRecognizer),
    }
}

/// Shared SQLSTATE class rules (ISO/IEC 9075).
fn classify_sql_state(state: &str) -> Option<ErrorKind> {
    let class = state.get(..2)?;
    match class {
        "08" => Some(ErrorKind::Connectivity),
        "28" => Some(ErrorKind::Auth),
        "23" => Some(ErrorKind::Constraint),
        "42" => Some(ErrorKind::Syntax),
        _ => None,
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresRecognizer;

impl ExceptionRecognizer for PostgresRecognizer {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::PostgreSQL
    }

    fn classify_database(&self, native: &NativeError) -> ErrorKind {
        let Some(state) = native.sql_state.as_deref().or(native.code.as_deref()) else {
            return ErrorKind::Unexpected;
        };
        match state {
            // admin_shutdown, crash_shutdown, cannot_connect_now, invalid_catalog_name
            "57P01" | "57P02" | "57P03" | "3D000" => ErrorKind::Connectivity,
            // insufficient_privilege
            "42501" => ErrorKind::Auth,
            // query_canceled, lock_not_available, idle_in_transaction_session_timeout
            "57014" | "55P03" | "25P03" => ErrorKind::Timeout,
            // invalid_schema_name
            "3F000" => ErrorKind::Syntax,
            _ => classify_sql_state(state).unwrap_or(ErrorKind::Unexpected),
        }
    }
}

// =============================================================================
// MySQL / MariaDB
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlRecognizer;

impl ExceptionRecognizer for MySqlRecognizer {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySQL
    }

    fn classify_database(&self, native: &NativeError) -> ErrorKind {
        let number = native.code.as_deref().and_then(|c| c.parse::<u32>().ok());
        let by_number = number.and_then(|n| match n {
            1044 | 1045 | 1142 | 1143 | 1227 | 1698 => Some(ErrorKind::Auth),
            1040 | 1042 | 1043 | 1047 | 1049 | 1053 | 1129 | 1130 | 2002 | 2003 | 2005
            | 2006 | 2013 | 2055 => Some(ErrorKind::Connectivity),
            1048 | 1062 | 1169 | 1216 | 1217 | 1364 | 1451 | 1452 | 1557 | 1586 | 3819 => {
                Some(ErrorKind::Constraint)
            }
            1205 | 1317 | 3024 | 3572 => Some(ErrorKind::Timeout),
            1050 | 1052 | 1054 | 1060 | 1064 | 1066 | 1109 | 1136 | 1146 | 1305 => {
                Some(ErrorKind::Syntax)
            }
            _ => None,
        });
        by_number
            .or_else(|| native.sql_state.as_deref().and_then(classify_sql_state))
            .unwrap_or(ErrorKind::Unexpected)
    }
}

// =============================================================================
// SQLite
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteRecognizer;

impl ExceptionRecognizer for SqliteRecognizer {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::SQLite
    }

    fn classify_database(&self, native: &NativeError) -> ErrorKind {
        // Extended result codes keep the primary code in the low byte.
        let Some(primary) = native
            .code
            .as_deref()
            .and_then(|c| c.parse::<u32>().ok())
            .map(|c| c & 0xFF)
        else {
            return ErrorKind::Unexpected;
        };
        match primary {
            // SQLITE_CONSTRAINT
            19 => ErrorKind::Constraint,
            // SQLITE_AUTH, SQLITE_PERM, SQLITE_READONLY
            23 | 3 | 8 => ErrorKind::Auth,
            // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_INTERRUPT
            5 | 6 | 9 => ErrorKind::Timeout,
            // SQLITE_CANTOPEN, SQLITE_NOTADB, SQLITE_IOERR
            14 | 26 | 10 => ErrorKind::Connectivity,
            // SQLITE_ERROR covers both bad SQL and generic failures
            1 => {
                let message = native.message.to_ascii_lowercase();
                let syntax = ["syntax error", "no such table", "no such column", "already exists"]
                    .iter()
                    .any(|m| message.contains(m));
                if syntax {
                    ErrorKind::Syntax
                } else {
                    ErrorKind::Unexpected
                }
            }
            _ => ErrorKind::Unexpected,
        }
    }
}

// =============================================================================
// Oracle
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleRecognizer;

impl OracleRecognizer {
    /// Extract NNNNN from `ORA-NNNNN` in the code, else in the message.
    /// A bare number is accepted as the code.
    fn ora_number(native: &NativeError) -> Option<u32> {
        fn after_prefix(text: &str) -> Option<u32> {
            let idx = text.to_ascii_uppercase().find("ORA-")?;
            leading_number(&text[idx + 4..])
        }
        fn leading_number(text: &str) -> Option<u32> {
            let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        native
            .code
            .as_deref()
            .and_then(|c| after_prefix(c).or_else(|| leading_number(c)))
            .or_else(|| after_prefix(&native.message))
    }
}

impl ExceptionRecognizer for OracleRecognizer {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Oracle
    }

    fn classify_database(&self, native: &NativeError) -> ErrorKind {
        match Self::ora_number(native) {
            Some(1 | 1400 | 1407 | 2290 | 2291 | 2292) => ErrorKind::Constraint,
            Some(1017 | 1031 | 1045 | 28000 | 28001) => ErrorKind::Auth,
            Some(
                12154 | 12170 | 12514 | 12505 | 12541 | 12543 | 12545 | 12560 | 3113 | 3114
                | 3135 | 1033 | 1034 | 1089 | 1092,
            ) => ErrorKind::Connectivity,
            Some(1013 | 30006 | 54 | 51 | 4021) => ErrorKind::Timeout,
            Some(900..=999 | 6550 | 1756) => ErrorKind::Syntax,
            _ => ErrorKind::Unexpected,
        }
    }
}
