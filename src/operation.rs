//! Classification of commands and the shapes of the server responses this engine reads.


use serde::Deserialize;

use crate::{
    bson::{self, Bson, Document, Timestamp},
    bson_util,
    client::session::cluster_time::ClusterTime,
    command::Command,
    error::{BulkWriteError, CommandError, Error, ErrorKind, WriteConcernError},
    trace::COMMAND_TRACING_EVENT_TARGET,
};

/// Commands that read data and therefore honor `readConcern.afterClusterTime`.
pub(crate) const CAUSAL_READ_COMMANDS: &[&str] = &[
    "aggregate",
    "count",
    "distinct",
    "find",
    "geoNear",
    "geoSearch",
    "group",
    "mapReduce",
    "mapreduce",
    "parallelCollectionScan",
];

#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Retryability {
    Write,
    None,
}

impl Retryability {
    /// Classifies a command as retry-eligible or not.
    ///
    /// Inserts and `findAndModify` are always eligible. Updates are eligible unless one of them
    /// is a multi-update, and deletes are eligible unless one of them may remove many documents.
    /// Unacknowledged commands are never eligible.
    pub(crate) fn of(command: &Command) -> Self {
        if command.is_unacknowledged() {
            return Self::None;
        }
        let eligible = match command.name() {
            "insert" | "findAndModify" | "findandmodify" => true,
            "update" => !statements(&command.body, "updates")
                .any(|update| update.get("multi").is_some_and(is_truthy)),
            "delete" => !statements(&command.body, "deletes").any(|delete| {
                delete
                    .get("limit")
                    .and_then(bson_util::get_int)
                    .is_some_and(|limit| limit == 0)
            }),
            _ => false,
        };
        if eligible {
            Self::Write
        } else {
            Self::None
        }
    }
}

fn statements<'a>(body: &'a Document, key: &str) -> impl Iterator<Item = &'a Document> {
    body.get_array(key)
        .into_iter()
        .flatten()
        .filter_map(Bson::as_document)
}

/// Reads a flag the way the server does: numbers count as true when non-zero.
fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        _ => false,
    }
}

/// Whether a command reads data in a way that can be made causally consistent. An `explain` is
/// a causal read when the explained command is.
pub(crate) fn is_causal_read(command: &Command) -> bool {
    let name = match command.name() {
        "explain" => match command.body.get_document("explain") {
            Ok(explained) => match bson_util::first_key(explained) {
                Some(name) => name,
                None => return false,
            },
            Err(_) => return false,
        },
        name => name,
    };
    CAUSAL_READ_COMMANDS.contains(&name)
}

/// The fields of every reply this engine inspects, independent of the command. Each field is
/// read on its own, so a malformed `$clusterTime` does not hide a valid `operationTime`.
#[derive(Debug, Default)]
pub(crate) struct CommandResponse {
    pub(crate) operation_time: Option<Timestamp>,
    pub(crate) cluster_time: Option<ClusterTime>,
}

impl CommandResponse {
    pub(crate) fn parse(response: &Document) -> Self {
        let operation_time = match response.get("operationTime") {
            Some(Bson::Timestamp(ts)) => Some(*ts),
            Some(other) => {
                tracing::debug!(
                    target: COMMAND_TRACING_EVENT_TARGET,
                    value = %other,
                    "Ignoring unreadable operationTime in reply"
                );
                None
            }
            None => None,
        };
        let cluster_time = response.get("$clusterTime").and_then(|value| {
            bson::from_bson::<ClusterTime>(value.clone())
                .map_err(|error| {
                    tracing::debug!(
                        target: COMMAND_TRACING_EVENT_TARGET,
                        error = %error,
                        "Ignoring unreadable $clusterTime in reply"
                    );
                })
                .ok()
        });
        Self {
            operation_time,
            cluster_time,
        }
    }
}

/// A response body useful for deserializing command errors.
#[derive(Deserialize, Debug)]
pub(crate) struct CommandErrorBody {
    #[serde(rename = "errorLabels")]
    pub(crate) error_labels: Option<Vec<String>>,

    #[serde(flatten)]
    pub(crate) command_error: CommandError,
}

impl From<CommandErrorBody> for Error {
    fn from(command_error_response: CommandErrorBody) -> Error {
        Error::new(
            ErrorKind::Command(command_error_response.command_error),
            command_error_response.error_labels,
        )
    }
}

/// An entry of the `upserted` array of an update reply.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub(crate) struct UpsertedEntry {
    pub(crate) index: usize,

    #[serde(rename = "_id")]
    pub(crate) id: Bson,
}

/// Body of the reply to an `insert`, `update` or `delete` command.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WriteResponseBody {
    #[serde(default)]
    pub(crate) n: i64,

    pub(crate) n_modified: Option<i64>,

    pub(crate) upserted: Option<Vec<UpsertedEntry>>,

    pub(crate) write_errors: Option<Vec<BulkWriteError>>,

    pub(crate) write_concern_error: Option<WriteConcernError>,
}

impl WriteResponseBody {
    pub(crate) fn parse(response: &Document) -> crate::error::Result<Self> {
        crate::bson::from_document(response.clone())
            .map_err(|e| Error::invalid_response(format!("malformed write reply: {e}")))
    }
}

/// Reads just enough of a reply to decide whether a retry-eligible write should be replayed.
pub(crate) fn has_retryable_error(response: &Document) -> bool {
    let ok = response.get("ok").and_then(bson_util::get_int) == Some(1);
    let code_is_retryable = |doc: &Document| {
        doc.get("code")
            .and_then(bson_util::get_int)
            .and_then(|code| i32::try_from(code).ok())
            .is_some_and(crate::error::is_retryable_write_code)
    };

    if !ok && code_is_retryable(response) {
        return true;
    }
    if let Ok(write_errors) = response.get_array("writeErrors") {
        if write_errors
            .iter()
            .filter_map(Bson::as_document)
            .any(code_is_retryable)
        {
            return true;
        }
    }
    matches!(response.get_document("writeConcernError"), Ok(wce) if code_is_retryable(wce))
}
