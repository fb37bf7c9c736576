use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{bson::Document, results::BulkWriteResult};

/// An error that occurred while applying a single operation of a bulk write. The `index` refers
/// to the operation's position in the caller's original sequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BulkWriteError {
    /// Index into the list of operations that this error corresponds to.
    #[serde(default)]
    pub index: usize,

    /// Identifies the type of write error.
    pub code: i32,

    /// The name of the error code, if the server reported one.
    #[serde(rename = "codeName", default)]
    pub code_name: Option<String>,

    /// A description of the error that occurred.
    #[serde(rename = "errmsg", default = "String::new")]
    pub message: String,

    /// The operation that failed, as it was sent to the server.
    #[serde(default)]
    pub op: Document,

    /// A document providing more information about the write error (e.g. details
    /// pertaining to document validation).
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// The aggregate failure of a bulk write: at least one write error or write concern error was
/// reported. Carries the complete partial result so that callers can inspect what succeeded.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct BulkWriteFailure {
    /// Everything that was applied and reported before execution stopped.
    pub result: BulkWriteResult,

    message: String,
}

impl BulkWriteFailure {
    pub(crate) fn new(result: BulkWriteResult) -> Self {
        let mut parts = Vec::new();
        if !result.write_errors.is_empty() {
            parts.push(format!("{} write errors", result.write_errors.len()));
        }
        if !result.write_concern_errors.is_empty() {
            parts.push("problem enforcing write concern".to_string());
        }
        Self {
            message: parts.join(" and "),
            result,
        }
    }

    /// A human readable summary of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The write errors, with indexes into the original operation sequence.
    pub fn write_errors(&self) -> &[BulkWriteError] {
        &self.result.write_errors
    }
}

impl fmt::Display for BulkWriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
