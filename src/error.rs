//! Error types shared by every layer of the mapper.

use rusqlite::ErrorCode;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A record type that cannot be mapped onto a table.
///
/// Raised the first time a type is described and cached alongside the type, so
/// every later call for the same type sees the same failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot map record `{record}`: {reason}")]
pub struct MappingError {
    pub record: &'static str,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("invalid column tag `{tag}`: {reason}")]
    InvalidTag { tag: String, reason: &'static str },

    #[error("failed to encode column `{column}`: {message}")]
    Encode { column: String, message: String },

    #[error("failed to decode column `{column}`: {message}")]
    Decode { column: String, message: String },

    #[error("operation canceled")]
    Canceled,

    #[error("record not found")]
    NotFound,

    #[error("callback failed: {0}")]
    Callback(#[source] anyhow::Error),

    #[error(transparent)]
    Driver(rusqlite::Error),
}

impl Error {
    pub(crate) fn encode(column: &str, message: impl ToString) -> Self {
        Error::Encode {
            column: column.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn decode(column: &str, message: impl ToString) -> Self {
        Error::Decode {
            column: column.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::OperationInterrupted =>
            {
                Error::Canceled
            }
            _ => Error::Driver(err),
        }
    }
}
