//! Contains the `Error` and `Result` types that this crate uses.

pub(crate) mod bulk_write;

use std::{collections::HashSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bson::Document;

pub use bulk_write::{BulkWriteError, BulkWriteFailure};

const NETWORK_ERROR_CODES: [i32; 4] = [6, 7, 89, 9001];
const NOTWRITABLEPRIMARY_CODES: [i32; 5] = [10107, 13435, 13436, 189, 11602];
const SHUTTING_DOWN_CODES: [i32; 2] = [11600, 91];
const WRITE_CONCERN_FAILED_CODE: i32 = 64;
const EXCEEDED_TIME_LIMIT_CODE: i32 = 262;

/// Retryable write error label. This label will be added to an error when the error is
/// write-retryable.
pub const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

/// The result type for all methods that can return an error in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur in this crate. The inner [`ErrorKind`] is wrapped in a `Box` to keep
/// the size of `Result`s small.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}, labels: {labels:?}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,

    labels: HashSet<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, labels: Option<impl IntoIterator<Item = String>>) -> Self {
        let mut labels: HashSet<String> = labels
            .map(|labels| labels.into_iter().collect())
            .unwrap_or_default();
        if let ErrorKind::Command(ref command_error) = kind {
            labels.extend(command_error.labels.iter().cloned());
        }
        Self {
            kind: Box::new(kind),
            labels,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn usage(message: impl Into<String>) -> Error {
        ErrorKind::Usage {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Error {
        ErrorKind::InvalidResponse {
            message: message.into(),
        }
        .into()
    }

    /// Whether this error was caused by the transport failing to complete a round trip.
    pub fn is_network_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Io(..))
    }

    /// Whether this error was raised locally because the API was misused.
    pub fn is_usage_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::Usage { .. })
    }

    /// Whether this error is the aggregate failure of a bulk write.
    pub fn is_bulk_write_error(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::BulkWrite(..))
    }

    /// The server error code carried by this error, if any.
    pub fn code(&self) -> Option<i32> {
        match self.kind.as_ref() {
            ErrorKind::Command(command_error) => Some(command_error.code),
            _ => None,
        }
    }

    /// Returns the labels for this error.
    pub fn labels(&self) -> &HashSet<String> {
        &self.labels
    }

    /// Whether this error contains the specified label.
    pub fn contains_label<T: AsRef<str>>(&self, label: T) -> bool {
        self.labels.contains(label.as_ref())
    }

    /// Adds the given label to this error.
    pub(crate) fn add_label<T: AsRef<str>>(&mut self, label: T) {
        self.labels.insert(label.as_ref().to_string());
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Error::new(err.into(), None::<Option<String>>)
    }
}

impl From<crate::bson::de::Error> for ErrorKind {
    fn from(err: crate::bson::de::Error) -> Self {
        Self::BsonDeserialization(err)
    }
}

impl From<crate::bson::ser::Error> for ErrorKind {
    fn from(err: crate::bson::ser::Error) -> Self {
        Self::BsonSerialization(err)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(err: std::io::ErrorKind) -> Self {
        Self::Io(Arc::new(err.into()))
    }
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    #[error("An invalid argument was provided: {message}")]
    #[non_exhaustive]
    InvalidArgument { message: String },

    /// The API was used in a way that can never succeed, e.g. executing a bulk write twice or
    /// using a session after it was ended. Raised before any network round trip.
    #[error("Usage error: {message}")]
    #[non_exhaustive]
    Usage { message: String },

    #[error("{0}")]
    BsonDeserialization(crate::bson::de::Error),

    #[error("{0}")]
    BsonSerialization(crate::bson::ser::Error),

    #[error("An error occurred when executing a bulk write: {0}")]
    BulkWrite(BulkWriteFailure),

    #[error("Command failed: {0}")]
    Command(CommandError),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("The server returned an invalid reply to a database operation: {message}")]
    #[non_exhaustive]
    InvalidResponse { message: String },

    #[error("The server does not support a database operation: {message}")]
    #[non_exhaustive]
    IncompatibleServer { message: String },
}

/// An error returned by the server in a response with `ok: 0`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct CommandError {
    pub code: i32,

    #[serde(rename = "codeName", default)]
    pub code_name: String,

    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,

    #[serde(rename = "errorLabels", default)]
    pub(crate) labels: Vec<String>,
}

impl fmt::Display for CommandError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "Error code {} ({}): {}",
            self.code, self.code_name, self.message
        )
    }
}

/// An error that occurred because the requested write acknowledgment could not be confirmed.
/// The write itself was applied.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub struct WriteConcernError {
    pub code: i32,

    #[serde(rename = "codeName", default)]
    pub code_name: String,

    #[serde(alias = "errmsg", default = "String::new")]
    pub message: String,

    #[serde(rename = "errInfo")]
    pub details: Option<Document>,

    #[serde(rename = "errorLabels", default)]
    pub(crate) labels: Vec<String>,
}

/// Whether a server error code allows a retryable write to be replayed.
pub(crate) fn is_retryable_write_code(code: i32) -> bool {
    NETWORK_ERROR_CODES.contains(&code)
        || NOTWRITABLEPRIMARY_CODES.contains(&code)
        || SHUTTING_DOWN_CODES.contains(&code)
        || code == WRITE_CONCERN_FAILED_CODE
        || code == EXCEEDED_TIME_LIMIT_CODE
}
