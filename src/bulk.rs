//! Queued writes that are split into wire-bounded batches and executed as one logical operation.

pub(crate) mod batch;

use serde::{Deserialize, Serialize};

use crate::{
    bson::{doc, Bson, Document},
    bson_util,
    client::check_ok,
    coll::Collection,
    concern::WriteConcern,
    error::{BulkWriteFailure, Error, ErrorKind, Result},
    operation::WriteResponseBody,
    results::BulkWriteResult,
    trace::BULK_TRACING_EVENT_TARGET,
    ClientSession,
};
pub use batch::Batch;
use batch::{build_batches, GENERATED_ID_SIZE_BYTES};

/// The three kinds of write a batch can hold.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "camelCase")]
pub enum WriteKind {
    #[display("insert")]
    Insert,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
}

impl WriteKind {
    pub(crate) fn command_name(self) -> &'static str {
        match self {
            WriteKind::Insert => "insert",
            WriteKind::Update => "update",
            WriteKind::Delete => "delete",
        }
    }

    /// The field of the write command that holds the operations.
    pub(crate) fn operations_field(self) -> &'static str {
        match self {
            WriteKind::Insert => "documents",
            WriteKind::Update => "updates",
            WriteKind::Delete => "deletes",
        }
    }
}

/// One logical write of a bulk write.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum WriteModel {
    /// Inserts `document`. An `_id` is generated when the document has none.
    Insert { document: Document },

    /// Updates the documents matching `filter`. A replacement is an update whose `update`
    /// document has no operator keys.
    Update {
        filter: Document,
        update: Document,
        multi: bool,
        upsert: bool,
        collation: Option<Document>,
        array_filters: Option<Vec<Document>>,
        hint: Option<Bson>,
    },

    /// Deletes the documents matching `filter`. A `limit` of 0 deletes every match, 1 deletes
    /// at most one.
    Delete {
        filter: Document,
        limit: i32,
        collation: Option<Document>,
        hint: Option<Bson>,
    },
}

impl WriteModel {
    pub fn kind(&self) -> WriteKind {
        match self {
            WriteModel::Insert { .. } => WriteKind::Insert,
            WriteModel::Update { .. } => WriteKind::Update,
            WriteModel::Delete { .. } => WriteKind::Delete,
        }
    }

    /// The element of the write command's operations array describing this model.
    pub(crate) fn to_wire_element(&self) -> Document {
        match self {
            WriteModel::Insert { document } => document.clone(),
            WriteModel::Update {
                filter,
                update,
                multi,
                upsert,
                collation,
                array_filters,
                hint,
            } => {
                let mut element = doc! {
                    "q": filter.clone(),
                    "u": update.clone(),
                    "multi": *multi,
                    "upsert": *upsert,
                };
                if let Some(collation) = collation {
                    element.insert("collation", collation.clone());
                }
                if let Some(array_filters) = array_filters {
                    element.insert("arrayFilters", array_filters.clone());
                }
                if let Some(hint) = hint {
                    element.insert("hint", hint.clone());
                }
                element
            }
            WriteModel::Delete {
                filter,
                limit,
                collation,
                hint,
            } => {
                let mut element = doc! { "q": filter.clone(), "limit": *limit };
                if let Some(collation) = collation {
                    element.insert("collation", collation.clone());
                }
                if let Some(hint) = hint {
                    element.insert("hint", hint.clone());
                }
                element
            }
        }
    }

    /// The encoded size of this model's wire element, including the `_id` that will be
    /// generated for an insert that lacks one.
    pub(crate) fn estimated_size(&self) -> Result<usize> {
        let size = bson_util::doc_size_bytes(&self.to_wire_element())?;
        Ok(match self {
            WriteModel::Insert { document } if !document.contains_key("_id") => {
                size + GENERATED_ID_SIZE_BYTES
            }
            _ => size,
        })
    }
}

/// A queue of writes against one collection, executed in wire-bounded batches.
///
/// Obtained from [`Collection::initialize_ordered_bulk_op`] or
/// [`Collection::initialize_unordered_bulk_op`]. A bulk write can be executed once.
///
/// ```rust
/// # use mongodb_session_engine::{bson::doc, Collection, error::Result};
/// #
/// # async fn bulk(coll: Collection) -> Result<()> {
/// let mut bulk = coll.initialize_ordered_bulk_op();
/// bulk.insert(doc! { "x": 1 })?;
/// bulk.find(doc! { "x": 1 }).upsert().update_one(doc! { "$inc": { "y": 1 } })?;
/// bulk.find(doc! { "x": 2 }).remove()?;
/// let result = bulk.execute(None).await?;
/// println!("inserted {}", result.n_inserted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BulkWrite {
    collection: Collection,
    ordered: bool,
    operations: Vec<WriteModel>,
    executed: bool,
}

impl BulkWrite {
    pub(crate) fn new(collection: Collection, ordered: bool) -> Self {
        Self {
            collection,
            ordered,
            operations: Vec::new(),
            executed: false,
        }
    }

    /// Whether this bulk write stops at the first batch reporting a write error.
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// The operations queued so far, in the order they were added.
    pub fn operations(&self) -> &[WriteModel] {
        &self.operations
    }

    /// Splits the queued operations into the batches that `execute` would send.
    pub fn batches(&self) -> Result<Vec<Batch>> {
        let options = self.collection.client().options();
        build_batches(
            &self.operations,
            options.max_write_batch_size,
            options.max_batch_size_bytes,
        )
    }

    fn check_not_executed(&self) -> Result<()> {
        if self.executed {
            return Err(Error::usage(
                "bulk write has already been executed and cannot be modified or re-executed",
            ));
        }
        Ok(())
    }

    fn push(&mut self, model: WriteModel) -> Result<()> {
        self.check_not_executed()?;
        self.operations.push(model);
        Ok(())
    }

    /// Queues an insert of `document`.
    pub fn insert(&mut self, document: Document) -> Result<()> {
        self.push(WriteModel::Insert { document })
    }

    /// Starts describing an update, replacement or removal of the documents matching `filter`.
    pub fn find(&mut self, filter: Document) -> FindOperators<'_> {
        FindOperators {
            bulk: self,
            filter,
            upsert: false,
            collation: None,
            array_filters: None,
            hint: None,
        }
    }

    /// Executes the queued operations with the given write concern, or the session's or
    /// client's default when `None`.
    ///
    /// If any operation fails or a write concern could not be satisfied, an error of kind
    /// [`ErrorKind::BulkWrite`] carrying the complete partial result is returned.
    pub async fn execute(
        &mut self,
        write_concern: impl Into<Option<WriteConcern>>,
    ) -> Result<BulkWriteResult> {
        self.execute_common(write_concern.into(), None).await
    }

    /// Executes the queued operations through `session`. See [`BulkWrite::execute`].
    pub async fn execute_with_session(
        &mut self,
        write_concern: impl Into<Option<WriteConcern>>,
        session: &mut ClientSession,
    ) -> Result<BulkWriteResult> {
        self.execute_common(write_concern.into(), Some(session))
            .await
    }

    async fn execute_common(
        &mut self,
        write_concern: Option<WriteConcern>,
        session: Option<&mut ClientSession>,
    ) -> Result<BulkWriteResult> {
        self.check_not_executed()?;
        if let Some(ref session) = session {
            session.check_not_ended()?;
        }
        if self.operations.is_empty() {
            return Err(Error::invalid_argument(
                "cannot execute a bulk write with no operations",
            ));
        }

        let client = self.collection.client().clone();
        let write_concern = write_concern
            .or_else(|| {
                session
                    .as_ref()
                    .and_then(|s| s.options())
                    .and_then(|o| o.write_concern.clone())
            })
            .or_else(|| client.options().write_concern.clone());
        if let Some(ref write_concern) = write_concern {
            write_concern.validate()?;
        }

        let batches = self.batches()?;
        self.executed = true;
        tracing::debug!(
            target: BULK_TRACING_EVENT_TARGET,
            namespace = %self.collection.namespace(),
            ordered = self.ordered,
            operations = self.operations.len(),
            batches = batches.len(),
            "Bulk write planned"
        );

        let mut implicit_session;
        let session = match session {
            Some(session) => session,
            None => {
                implicit_session = client.start_implicit_session();
                &mut implicit_session
            }
        };

        let mut result = BulkWriteResult::new();
        for (index, batch) in batches.iter().enumerate() {
            let (command, elements) =
                batch.build_command(&self.collection, self.ordered, write_concern.as_ref())?;
            tracing::debug!(
                target: BULK_TRACING_EVENT_TARGET,
                batch = index,
                kind = %batch.kind(),
                originalOffset = batch.original_offset(),
                count = batch.len(),
                sizeBytes = batch.size_bytes(),
                "Dispatching batch"
            );

            let response = client.execute_command(command, Some(&mut *session)).await?;
            let response = check_ok(response)?;
            let body = WriteResponseBody::parse(&response)?;
            let had_write_errors = body
                .write_errors
                .as_ref()
                .is_some_and(|errors| !errors.is_empty());
            result.merge_batch(batch, &elements, body);

            if self.ordered && had_write_errors {
                result.write_concern_errors.clear();
                tracing::debug!(
                    target: BULK_TRACING_EVENT_TARGET,
                    batch = index,
                    remaining = batches.len() - index - 1,
                    "Stopping ordered bulk write after write errors"
                );
                break;
            }
        }

        if result.write_errors.is_empty() && result.write_concern_errors.is_empty() {
            Ok(result)
        } else {
            Err(ErrorKind::BulkWrite(BulkWriteFailure::new(result)).into())
        }
    }

    /// The `explain` command for this bulk write. Only bulk writes that fit in exactly one batch
    /// can be explained.
    pub fn explain_command(&self, verbosity: &str) -> Result<Document> {
        let batches = self.batches()?;
        let batch = match batches.as_slice() {
            [batch] => batch,
            _ => {
                return Err(Error::usage(format!(
                    "explain requires a bulk write of exactly one batch, this one has {}",
                    batches.len()
                )))
            }
        };
        let (command, _) = batch.build_command(&self.collection, self.ordered, None)?;
        command.into_explain(verbosity)?.into_document()
    }

    /// Runs the `explain` command for this bulk write and returns the server's reply.
    pub async fn explain(&self, verbosity: &str) -> Result<Document> {
        let command = self.explain_command(verbosity)?;
        self.collection
            .database()
            .run_command(command, None)
            .await
    }
}

/// Describes writes against the documents matching a filter. Obtained from
/// [`BulkWrite::find`]; modifiers apply to the terminal operation that follows them.
#[derive(Debug)]
pub struct FindOperators<'a> {
    bulk: &'a mut BulkWrite,
    filter: Document,
    upsert: bool,
    collation: Option<Document>,
    array_filters: Option<Vec<Document>>,
    hint: Option<Bson>,
}

impl FindOperators<'_> {
    /// Inserts a document when an update or replacement matches nothing.
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    pub fn collation(mut self, collation: Document) -> Self {
        self.collation = Some(collation);
        self
    }

    /// Filters selecting which array elements an update modifies.
    pub fn array_filters(mut self, array_filters: Vec<Document>) -> Self {
        self.array_filters = Some(array_filters);
        self
    }

    /// The index to use, by name or by key pattern.
    pub fn hint(mut self, hint: impl Into<Bson>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Updates the first matching document. `update` must consist of update operators.
    pub fn update_one(self, update: Document) -> Result<()> {
        bson_util::update_document_check(&update)?;
        self.push_update(update, false)
    }

    /// Updates every matching document. `update` must consist of update operators.
    pub fn update(self, update: Document) -> Result<()> {
        bson_util::update_document_check(&update)?;
        self.push_update(update, true)
    }

    /// Replaces the first matching document. `replacement` must not contain update operators.
    pub fn replace_one(self, replacement: Document) -> Result<()> {
        bson_util::replacement_document_check(&replacement)?;
        self.push_update(replacement, false)
    }

    /// Removes the first matching document.
    pub fn remove_one(self) -> Result<()> {
        self.push_delete(1)
    }

    /// Removes every matching document.
    pub fn remove(self) -> Result<()> {
        self.push_delete(0)
    }

    fn push_update(self, update: Document, multi: bool) -> Result<()> {
        self.bulk.push(WriteModel::Update {
            filter: self.filter,
            update,
            multi,
            upsert: self.upsert,
            collation: self.collation,
            array_filters: self.array_filters,
            hint: self.hint,
        })
    }

    fn push_delete(self, limit: i32) -> Result<()> {
        self.bulk.push(WriteModel::Delete {
            filter: self.filter,
            limit,
            collation: self.collation,
            hint: self.hint,
        })
    }
}
