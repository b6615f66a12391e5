//! Error types for the database access layer.
//!
//! Every native driver failure is converted into a [`NativeError`] descriptor at
//! the point it leaves the driver, and then classified by the database kind's
//! exception recognizer into one [`DbError`] variant. Raw `sqlx::Error` values
//! never travel past that boundary.

use thiserror::Error;

/// Boxed error used for attached causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Portable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Initialization,
    Connectivity,
    Auth,
    Constraint,
    Timeout,
    Syntax,
    Conversion,
    NotConnected,
    InvalidInput,
    Unexpected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initialization => "initialization",
            Self::Connectivity => "connectivity",
            Self::Auth => "auth",
            Self::Constraint => "constraint",
            Self::Timeout => "timeout",
            Self::Syntax => "syntax",
            Self::Conversion => "conversion",
            Self::NotConnected => "not connected",
            Self::InvalidInput => "invalid input",
            Self::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// Where a native failure came from inside the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOrigin {
    /// The server answered with an error (code / SQLSTATE available).
    Database,
    /// Socket level failure.
    Io,
    Tls,
    /// Malformed or unexpected wire traffic.
    Protocol,
    /// The connection string or options were rejected by the driver.
    Configuration,
    /// The driver's own acquire timeout elapsed.
    PoolTimeout,
    /// A column value could not be decoded.
    Decode,
    Other,
}

/// Descriptor of one native driver error, as handed to a recognizer.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct NativeError {
    pub origin: NativeOrigin,
    /// Vendor error code (e.g. `1062`, `ORA-00001`, `2067`).
    pub code: Option<String>,
    /// SQLSTATE, when the driver reports one.
    pub sql_state: Option<String>,
    pub message: String,
    #[source]
    pub cause: Option<BoxError>,
}

impl NativeError {
    /// Create a server-side error descriptor.
    pub fn database(
        code: Option<&str>,
        sql_state: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            origin: NativeOrigin::Database,
            code: code.map(String::from),
            sql_state: sql_state.map(String::from),
            message: message.into(),
            cause: None,
        }
    }

    /// Create a descriptor with no server code.
    pub fn with_origin(origin: NativeOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            code: None,
            sql_state: None,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach the original driver error.
    pub fn caused_by(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl From<sqlx::Error> for NativeError {
    fn from(err: sqlx::Error) -> Self {
        let (origin, code, sql_state, message) = match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.into_owned());
                // MySQL reports the vendor number separately from SQLSTATE.
                let mysql_err = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>();
                let (code, sql_state) = match mysql_err {
                    Some(my_err) => (Some(my_err.number().to_string()), code),
                    None => match db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
                        Some(_) => (code.clone(), code),
                        None => (code, None),
                    },
                };
                (
                    NativeOrigin::Database,
                    code,
                    sql_state,
                    db_err.message().to_string(),
                )
            }
            sqlx::Error::Io(io_err) => (NativeOrigin::Io, None, None, format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => (NativeOrigin::Tls, None, None, format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => {
                (NativeOrigin::Protocol, None, None, format!("Protocol error: {}", msg))
            }
            sqlx::Error::Configuration(msg) => (
                NativeOrigin::Configuration,
                None,
                None,
                format!("Invalid connection options: {}", msg),
            ),
            sqlx::Error::PoolTimedOut => (
                NativeOrigin::PoolTimeout,
                None,
                None,
                "Timed out acquiring a connection".to_string(),
            ),
            sqlx::Error::PoolClosed => (
                NativeOrigin::Io,
                None,
                None,
                "Connection pool is closed".to_string(),
            ),
            sqlx::Error::ColumnDecode { index, source } => (
                NativeOrigin::Decode,
                None,
                None,
                format!("Failed to decode column {}: {}", index, source),
            ),
            sqlx::Error::Decode(source) => {
                (NativeOrigin::Decode, None, None, format!("Decode error: {}", source))
            }
            other => (NativeOrigin::Other, None, None, other.to_string()),
        };

        Self {
            origin,
            code,
            sql_state,
            message,
            cause: Some(Box::new(err)),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Initialization failed: {message}")]
    Initialization {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Connection failed: {message} ({context})")]
    Connectivity {
        message: String,
        context: String,
        #[source]
        native: Option<Box<NativeError>>,
    },

    #[error("Access denied: {native} ({context})")]
    Auth {
        context: String,
        #[source]
        native: Box<NativeError>,
    },

    #[error("Constraint violated: {native} ({context})")]
    Constraint {
        context: String,
        #[source]
        native: Box<NativeError>,
    },

    #[error("Timeout: {native} ({context})")]
    Timeout {
        context: String,
        #[source]
        native: Box<NativeError>,
    },

    #[error("SQL error: {native} ({context})")]
    Syntax {
        context: String,
        #[source]
        native: Box<NativeError>,
    },

    #[error("Cannot convert column {column} ({native_type}): {message}")]
    Conversion {
        column: String,
        native_type: String,
        message: String,
    },

    #[error("Not connected to {database}")]
    NotConnected { database: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Unexpected database error: {native} ({context})")]
    Unexpected {
        context: String,
        #[source]
        native: Box<NativeError>,
    },

    #[error("{primary} (rollback also failed: {rollback})")]
    RollbackFailed {
        #[source]
        primary: Box<DbError>,
        rollback: Box<DbError>,
    },
}

impl DbError {
    /// Create an initialization error.
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an initialization error with an attached cause.
    pub fn initialization_with(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Initialization {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// Create a connectivity error without a native descriptor.
    pub fn connectivity(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            context: context.into(),
            native: None,
        }
    }

    /// Create a conversion error.
    pub fn conversion(
        column: impl Into<String>,
        native_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            column: column.into(),
            native_type: native_type.into(),
            message: message.into(),
        }
    }

    /// Create a not-connected error.
    pub fn not_connected(database: impl Into<String>) -> Self {
        Self::NotConnected {
            database: database.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Build the error for a recognized native failure.
    pub fn from_native(kind: ErrorKind, native: NativeError, context: impl Into<String>) -> Self {
        let context = context.into();
        let native = Box::new(native);
        match kind {
            ErrorKind::Connectivity => Self::Connectivity {
                message: native.message.clone(),
                context,
                native: Some(native),
            },
            ErrorKind::Auth => Self::Auth { context, native },
            ErrorKind::Constraint => Self::Constraint { context, native },
            ErrorKind::Timeout => Self::Timeout { context, native },
            ErrorKind::Syntax => Self::Syntax { context, native },
            ErrorKind::Initialization => Self::Initialization {
                message: format!("{} ({})", native.message, context),
                cause: Some(native as BoxError),
            },
            ErrorKind::Conversion => Self::Conversion {
                column: context,
                native_type: "unknown".to_string(),
                message: native.message.clone(),
            },
            ErrorKind::NotConnected | ErrorKind::InvalidInput | ErrorKind::Unexpected => {
                Self::Unexpected { context, native }
            }
        }
    }

    /// Attach a rollback failure to this (primary) error.
    pub fn with_rollback_failure(self, rollback: DbError) -> Self {
        Self::RollbackFailed {
            primary: Box::new(self),
            rollback: Box::new(rollback),
        }
    }

    /// The portable kind of this error. A failed rollback reports the kind of
    /// the error that caused it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Initialization { .. } => ErrorKind::Initialization,
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Constraint { .. } => ErrorKind::Constraint,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Syntax { .. } => ErrorKind::Syntax,
            Self::Conversion { .. } => ErrorKind::Conversion,
            Self::NotConnected { .. } => ErrorKind::NotConnected,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
            Self::RollbackFailed { primary, .. } => primary.kind(),
        }
    }

    /// The native descriptor this error was recognized from, if any.
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            Self::Connectivity { native, .. } => native.as_deref(),
            Self::Auth { native, .. }
            | Self::Constraint { native, .. }
            | Self::Timeout { native, .. }
            | Self::Syntax { native, .. }
            | Self::Unexpected { native, .. } => Some(native),
            Self::RollbackFailed { primary, .. } => primary.native(),
            _ => None,
        }
    }

    /// The secondary rollback failure, if one was attached.
    pub fn rollback_error(&self) -> Option<&DbError> {
        match self {
            Self::RollbackFailed { rollback, .. } => Some(rollback),
            _ => None,
        }
    }

    /// Get a short hint for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::Initialization => Some("Check that the driver for this database kind is available"),
            ErrorKind::Connectivity => Some("Check network connectivity and database server status"),
            ErrorKind::Auth => Some("Verify the user name, password and granted privileges"),
            ErrorKind::Constraint => Some("Check the data against the table constraints"),
            ErrorKind::Timeout => Some("Retry later or reduce lock contention"),
            ErrorKind::Syntax => Some("Check the SQL syntax and referenced objects"),
            ErrorKind::Conversion => Some("Request a target type that can hold the column value"),
            ErrorKind::NotConnected => Some("Call connect() before starting a session"),
            ErrorKind::InvalidInput | ErrorKind::Unexpected => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connectivity | ErrorKind::Timeout)
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
