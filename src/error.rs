//! Error types for qail-mariadb.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::Handle;
use crate::types::ValueType;

/// The main error type for MariaDB operations.
#[derive(Debug, Error)]
pub enum MariaError {
    /// A time-of-day component is out of range.
    #[error(
        "Invalid time: hour - {hour}, minute - {minute}, second - {second}, millisecond - {millisecond}"
    )]
    Time {
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
    },

    /// A calendar date or its time part is out of range.
    #[error(
        "Invalid date time: year - {year}, month - {month}, day - {day}, hour - {hour}, minute - {minute}, second - {second}, millisecond - {millisecond}"
    )]
    DateTime {
        year: u32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
    },

    /// A time span component is out of range.
    #[error("Invalid time span: {field} - {value} (must be <= {limit})")]
    TimeSpan {
        field: &'static str,
        value: u32,
        limit: u32,
    },

    /// Unparsable text input.
    #[error("Invalid {what} format: '{input}'")]
    Format { what: &'static str, input: String },

    /// Decimal overflow or malformed input.
    #[error("Decimal error: {0}")]
    Decimal(String),

    /// Requested accessor type is incompatible with the column type.
    #[error("Type mismatch: requested {requested}, column is {actual}")]
    TypeMismatch {
        requested: ValueType,
        actual: ValueType,
    },

    /// Index-based access past the end.
    #[error("Index {index} out of range (count {count})")]
    OutOfRange { index: usize, count: usize },

    /// Column lookup by name failed.
    #[error("Unknown column: '{0}'")]
    UnknownColumn(String),

    /// Cell access without a current row.
    #[error("No current row")]
    NoRow,

    /// A typed accessor hit a NULL cell.
    #[error("Unexpected NULL in column {0}")]
    UnexpectedNull(usize),

    /// Error reported by the server or the client library.
    #[error("MariaDB error({code}): {message}")]
    Connection { code: u32, message: String },

    /// Operation needs a live connection.
    #[error("Not connected")]
    NotConnected,

    /// Malformed or unexpected packet.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Authentication failed.
    #[error("Auth error: {0}")]
    Auth(String),

    /// TLS setup or handshake failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Handle is unknown or already released.
    #[error("Unknown job handle: {0}")]
    UnknownHandle(Handle),

    /// The job finished with an error.
    #[error("Job {handle} failed: {reason}")]
    JobFailed { handle: Handle, reason: String },

    /// The job has not finished yet.
    #[error("Job {0} has not finished")]
    JobPending(Handle),

    /// The query result of this job was already taken.
    #[error("Result of job {0} was already taken")]
    ResultTaken(Handle),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of [`MariaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Format,
    TypeCoercion,
    Connection,
    OutOfRange,
    Job,
    Config,
}

impl MariaError {
    /// Create a format error for the given kind of input.
    pub fn format(what: &'static str, input: impl Into<String>) -> Self {
        Self::Format {
            what,
            input: input.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Time { .. } | Self::DateTime { .. } | Self::TimeSpan { .. } => {
                ErrorKind::Validation
            }
            Self::Format { .. } | Self::Decimal(_) => ErrorKind::Format,
            Self::TypeMismatch { .. } | Self::UnexpectedNull(_) => ErrorKind::TypeCoercion,
            Self::OutOfRange { .. } | Self::UnknownColumn(_) | Self::NoRow => ErrorKind::OutOfRange,
            Self::Connection { .. }
            | Self::NotConnected
            | Self::Protocol(_)
            | Self::Auth(_)
            | Self::Tls(_)
            | Self::Io(_) => ErrorKind::Connection,
            Self::UnknownHandle(_)
            | Self::JobPending(_)
            | Self::JobFailed { .. }
            | Self::ResultTaken(_) => {
                ErrorKind::Job
            }
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Numeric code for [`LastError`]; server errors keep theirs.
    pub fn code(&self) -> u32 {
        match self {
            Self::Connection { code, .. } => *code,
            _ => 0,
        }
    }
}

impl From<toml::de::Error> for MariaError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type alias for MariaDB operations.
pub type MariaResult<T> = Result<T, MariaError>;

/// How connection-level errors surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPolicy {
    /// Emit a `tracing` error event when an error is detected.
    pub log: bool,
    /// Return `Err`. When false, the error is recorded in `last_error()`
    /// and the operation returns a neutral value.
    pub raise: bool,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            log: true,
            raise: true,
        }
    }
}

/// Last error recorded on a connection or statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    pub code: u32,
    pub message: String,
}

impl From<&MariaError> for LastError {
    fn from(e: &MariaError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MariaError::Time {
            hour: 24,
            minute: 0,
            second: 0,
            millisecond: 0,
        };
        assert_eq!(
            err.to_string(),
            "Invalid time: hour - 24, minute - 0, second - 0, millisecond - 0"
        );
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = MariaError::TypeMismatch {
            requested: ValueType::Double64,
            actual: ValueType::Signed32,
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch: requested double64, column is signed32"
        );
        assert_eq!(err.kind(), ErrorKind::TypeCoercion);
    }

    #[test]
    fn test_last_error_keeps_server_code() {
        let err = MariaError::Connection {
            code: 1064,
            message: "You have an error in your SQL syntax".into(),
        };
        let last = LastError::from(&err);
        assert_eq!(last.code, 1064);
        assert!(last.message.contains("SQL syntax"));
    }
}
