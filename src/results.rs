//! Contains the types of results returned by bulk writes.

use serde::Serialize;

use crate::{
    bson::{Bson, Document},
    bulk::{Batch, WriteKind},
    error::{BulkWriteError, Error, Result, WriteConcernError},
    operation::WriteResponseBody,
};

/// A document inserted by an upsert, identified by the index of the operation that inserted it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[non_exhaustive]
pub struct UpsertedId {
    /// Index of the operation in the bulk write.
    pub index: usize,

    /// The `_id` of the inserted document.
    #[serde(rename = "_id")]
    pub id: Bson,
}

/// The merged outcome of every batch of a bulk write.
///
/// All indexes refer to positions in the caller's original sequence of operations.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct BulkWriteResult {
    pub n_inserted: i64,

    /// The number of documents inserted by upserts.
    pub n_upserted: i64,

    /// The number of documents matched by updates, not counting upserts.
    pub n_matched: i64,

    /// The number of documents actually modified by updates. `None` when at least one update
    /// reply did not report it.
    pub n_modified: Option<i64>,

    pub n_removed: i64,

    pub upserted: Vec<UpsertedId>,

    pub write_errors: Vec<BulkWriteError>,

    pub write_concern_errors: Vec<WriteConcernError>,

    /// The kind of the only batch executed, or `None` when several batches were executed.
    pub batch_kind: Option<WriteKind>,

    #[serde(skip)]
    batch_count: usize,
}

impl BulkWriteResult {
    pub(crate) fn new() -> Self {
        Self {
            n_inserted: 0,
            n_upserted: 0,
            n_matched: 0,
            n_modified: Some(0),
            n_removed: 0,
            upserted: Vec::new(),
            write_errors: Vec::new(),
            write_concern_errors: Vec::new(),
            batch_kind: None,
            batch_count: 0,
        }
    }

    /// The number of batches merged into this result.
    pub fn batch_count(&self) -> usize {
        self.batch_count
    }

    /// Folds one batch reply into the result. `elements` are the operations exactly as they were
    /// sent, used to attach the failing operation to each write error.
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn merge_batch(
        &mut self,
        batch: &Batch,
        elements: &[Document],
        response: WriteResponseBody,
    ) {
        let offset = batch.original_offset();
        self.batch_count += 1;
        self.batch_kind = if self.batch_count == 1 {
            Some(batch.kind())
        } else {
            None
        };

        match batch.kind() {
            WriteKind::Insert => self.n_inserted += response.n,
            WriteKind::Delete => self.n_removed += response.n,
            WriteKind::Update => {
                let upserted = response.upserted.unwrap_or_default();
                let n_upserted = upserted.len() as i64;
                self.n_upserted += n_upserted;
                self.n_matched += response.n - n_upserted;
                self.n_modified = match (self.n_modified, response.n_modified) {
                    (Some(total), Some(n_modified)) => Some(total + n_modified),
                    _ => None,
                };
                self.upserted
                    .extend(upserted.into_iter().map(|entry| UpsertedId {
                        index: entry.index + offset,
                        id: entry.id,
                    }));
            }
        }

        for mut write_error in response.write_errors.unwrap_or_default() {
            if let Some(op) = elements.get(write_error.index) {
                write_error.op = op.clone();
            }
            write_error.index += offset;
            self.write_errors.push(write_error);
        }

        if let Some(write_concern_error) = response.write_concern_error {
            self.write_concern_errors.push(write_concern_error);
        }
    }

    /// Narrows the result of a bulk write that executed exactly one batch to the counters that
    /// are meaningful for that batch's kind.
    pub fn to_single_result(&self) -> Result<SingleWriteResult> {
        let kind = match (self.batch_count, self.batch_kind) {
            (1, Some(kind)) => kind,
            _ => {
                return Err(Error::usage(format!(
                    "a single result is only available for a bulk write of exactly one batch, \
                     this one executed {}",
                    self.batch_count
                )))
            }
        };
        Ok(match kind {
            WriteKind::Insert => SingleWriteResult::Insert {
                n_inserted: self.n_inserted,
            },
            WriteKind::Update => SingleWriteResult::Update {
                n_matched: self.n_matched,
                n_modified: self.n_modified,
                n_upserted: self.n_upserted,
                upserted_id: self.upserted.first().map(|upserted| upserted.id.clone()),
            },
            WriteKind::Delete => SingleWriteResult::Delete {
                n_removed: self.n_removed,
            },
        })
    }
}

/// The result of a bulk write that executed a single batch, narrowed to its kind.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum SingleWriteResult {
    Insert {
        n_inserted: i64,
    },
    Update {
        n_matched: i64,
        n_modified: Option<i64>,
        n_upserted: i64,
        /// The `_id` of the first document inserted by an upsert, if any.
        upserted_id: Option<Bson>,
    },
    Delete {
        n_removed: i64,
    },
}
