use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("corrupt state in {location}: {reason}")]
    CorruptState { location: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid token format")]
    InvalidTokenFormat,

    #[error("token expired")]
    TokenExpired,
}

/// Coarse classification callers use to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    StorageUnavailable,
    CorruptState,
    Config,
    Internal,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::Conflict,
            Error::Unauthorized | Error::InvalidTokenFormat | Error::TokenExpired => {
                ErrorKind::Unauthorized
            }
            Error::Io(_) | Error::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            // Busy and locked codes never reach this variant.
            Error::Database(_) => ErrorKind::Internal,
            Error::CorruptState { .. } => ErrorKind::CorruptState,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub fn corrupt(location: impl Into<String>, reason: impl ToString) -> Self {
        Error::CorruptState {
            location: location.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        if matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..)
        ) {
            return Error::corrupt("database", err);
        }

        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Error::StorageUnavailable(err.to_string())
            }
            Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => {
                Error::corrupt("database", err)
            }
            _ => Error::Database(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
