use thiserror::Error;

/// Closed set of wire-level error codes (§6). Numeric values are a stable
/// contract between client and server and must never be renumbered; the
/// wire representation is the integer itself, not the variant name, so
/// `Serialize`/`Deserialize` are hand-written against the discriminant
/// rather than derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    InvalidRequest = 1,
    ValidationError = 2,
    DatabaseError = 3,
    TransactionError = 4,
    InternalError = 5,
    Timeout = 6,
    QueueFull = 7,
    ConnectionError = 8,
    NotFound = 9,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::TransactionError => "transaction_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::Timeout => "timeout",
            ErrorCode::QueueFull => "queue_full",
            ErrorCode::ConnectionError => "connection_error",
            ErrorCode::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ErrorCode::InvalidRequest),
            2 => Ok(ErrorCode::ValidationError),
            3 => Ok(ErrorCode::DatabaseError),
            4 => Ok(ErrorCode::TransactionError),
            5 => Ok(ErrorCode::InternalError),
            6 => Ok(ErrorCode::Timeout),
            7 => Ok(ErrorCode::QueueFull),
            8 => Ok(ErrorCode::ConnectionError),
            9 => Ok(ErrorCode::NotFound),
            other => Err(other),
        }
    }
}

impl serde::Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        (*self as i32).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        ErrorCode::try_from(value)
            .map_err(|other| serde::de::Error::custom(format!("unknown error code: {other}")))
    }
}

/// Driver-side operation errors. Every fallible driver method returns this
/// type; handlers convert it into an `Error` result (§7) via [`DbError::code`].
#[derive(Debug, Error)]
pub enum DbError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl DbError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::Validation(_) => ErrorCode::ValidationError,
            DbError::Database(_) | DbError::Sqlite(_) => ErrorCode::DatabaseError,
            DbError::Transaction(_) => ErrorCode::TransactionError,
            DbError::NotFound(_) => ErrorCode::NotFound,
            DbError::Timeout => ErrorCode::Timeout,
            DbError::Internal(_) | DbError::Io(_) => ErrorCode::InternalError,
        }
    }
}
