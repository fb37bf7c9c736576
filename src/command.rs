
use crate::{
    bson::{self, doc, Bson, Document, Timestamp},
    bson_util,
    client::session::cluster_time::ClusterTime,
    concern::WriteConcern,
    error::{Error, Result},
    selection_criteria::ReadPreference,
};

/// Engine-side model of a database command.
///
/// The command body is kept as a document while the fields this engine reads or writes while
/// decorating a command are lifted into typed slots. They are written back into the body only
/// when the command is handed to the channel, see [`Command::into_document`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Command {
    pub(crate) name: String,

    pub(crate) target_db: String,

    /// The command document without any of the lifted fields. Its first key is `name`.
    pub(crate) body: Document,

    pub(crate) lsid: Option<Document>,

    pub(crate) cluster_time: Option<ClusterTime>,

    pub(crate) txn_number: Option<i64>,

    pub(crate) read_concern: Option<Document>,

    pub(crate) write_concern: Option<Document>,

    /// Wrapper-level read preference. Travels beside the command rather than inside it.
    pub(crate) read_preference: Option<ReadPreference>,

    /// Fields of a `query`/`$query` wrapper other than `$readPreference`. Appended last.
    wrapper_fields: Document,
}

impl Command {
    pub(crate) fn new(name: impl ToString, target_db: impl ToString, body: Document) -> Self {
        Self {
            name: name.to_string(),
            target_db: target_db.to_string(),
            body,
            lsid: None,
            cluster_time: None,
            txn_number: None,
            read_concern: None,
            write_concern: None,
            read_preference: None,
            wrapper_fields: Document::new(),
        }
    }

    /// Builds a command from a raw command document, unwrapping a `query`/`$query` wrapper once
    /// and lifting the well-known decoration fields.
    pub(crate) fn from_document(target_db: impl ToString, document: Document) -> Result<Self> {
        let (mut inner, mut wrapper) = unwrap_query(document)?;

        let name = match bson_util::first_key(&inner) {
            Some(name) => name.to_string(),
            None => return Err(Error::invalid_argument("command document must not be empty")),
        };

        let read_preference_doc = match wrapper.remove("$readPreference") {
            Some(read_preference) => Some(read_preference),
            None => inner.remove("$readPreference"),
        };
        let read_preference = match read_preference_doc {
            Some(Bson::Document(doc)) => Some(ReadPreference::from_document(doc)?),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "$readPreference must be a document, got {other}"
                )))
            }
            None => None,
        };

        let lsid = match inner.remove("lsid") {
            Some(Bson::Document(lsid)) => Some(lsid),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "lsid must be a document, got {other}"
                )))
            }
            None => None,
        };

        let cluster_time = match inner.remove("$clusterTime") {
            Some(cluster_time) => Some(bson::from_bson::<ClusterTime>(cluster_time).map_err(
                |e| Error::invalid_argument(format!("invalid $clusterTime: {e}")),
            )?),
            None => None,
        };

        let txn_number = match inner.remove("txnNumber") {
            Some(txn_number) => match bson_util::get_int(&txn_number) {
                Some(n) => Some(n),
                None => {
                    return Err(Error::invalid_argument(format!(
                        "txnNumber must be an integer, got {txn_number}"
                    )))
                }
            },
            None => None,
        };

        let read_concern = take_document(&mut inner, "readConcern")?;
        let write_concern = take_document(&mut inner, "writeConcern")?;

        Ok(Self {
            name,
            target_db: target_db.to_string(),
            body: inner,
            lsid,
            cluster_time,
            txn_number,
            read_concern,
            write_concern,
            read_preference,
            wrapper_fields: wrapper,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_session(&mut self, lsid: &Document) {
        self.lsid = Some(lsid.clone());
    }

    pub(crate) fn set_cluster_time(&mut self, cluster_time: &ClusterTime) {
        self.cluster_time = Some(cluster_time.clone());
    }

    pub(crate) fn set_txn_number(&mut self, txn_number: i64) {
        self.txn_number = Some(txn_number);
    }

    /// Sets `readConcern.afterClusterTime`, keeping any other read concern fields.
    pub(crate) fn set_after_cluster_time(&mut self, operation_time: Timestamp) {
        self.read_concern
            .get_or_insert_with(Document::new)
            .insert("afterClusterTime", operation_time);
    }

    pub(crate) fn has_after_cluster_time(&self) -> bool {
        self.read_concern
            .as_ref()
            .is_some_and(|rc| rc.contains_key("afterClusterTime"))
    }

    pub(crate) fn set_write_concern(&mut self, write_concern: &WriteConcern) -> Result<()> {
        if write_concern.is_empty() {
            self.write_concern = None;
        } else {
            self.write_concern = Some(write_concern.to_document()?);
        }
        Ok(())
    }

    /// Whether the attached write concern requests no acknowledgment.
    pub(crate) fn is_unacknowledged(&self) -> bool {
        let Some(ref write_concern) = self.write_concern else {
            return false;
        };
        let w_is_zero = write_concern
            .get("w")
            .and_then(bson_util::get_int)
            .is_some_and(|w| w == 0);
        w_is_zero && !matches!(write_concern.get("j"), Some(Bson::Boolean(true)))
    }

    /// Serializes the command into the document handed to the channel.
    pub(crate) fn into_document(self) -> Result<Document> {
        let mut document = self.body;
        if let Some(lsid) = self.lsid {
            document.insert("lsid", lsid);
        }
        if let Some(cluster_time) = self.cluster_time {
            document.insert("$clusterTime", bson::to_bson(&cluster_time)?);
        }
        if let Some(txn_number) = self.txn_number {
            document.insert("txnNumber", txn_number);
        }
        if let Some(read_concern) = self.read_concern {
            document.insert("readConcern", read_concern);
        }
        if let Some(write_concern) = self.write_concern {
            document.insert("writeConcern", write_concern);
        }
        document.extend(self.wrapper_fields);
        Ok(document)
    }

    /// Wraps this command for the `explain` command.
    pub(crate) fn into_explain(self, verbosity: impl Into<String>) -> Result<Command> {
        let target_db = self.target_db.clone();
        let inner = self.into_document()?;
        Ok(Command::new(
            "explain",
            target_db,
            doc! { "explain": inner, "verbosity": verbosity.into() },
        ))
    }
}

/// Splits a `query`/`$query` wrapped command into the inner command and the wrapper's remaining
/// fields. Unwrapped commands are returned as is with an empty wrapper.
fn unwrap_query(mut document: Document) -> Result<(Document, Document)> {
    let wrapper_key = match bson_util::first_key(&document) {
        Some(key @ ("query" | "$query")) => key.to_string(),
        _ => return Ok((document, Document::new())),
    };
    match document.remove(&wrapper_key) {
        Some(Bson::Document(inner)) => Ok((inner, document)),
        Some(other) => Err(Error::invalid_argument(format!(
            "{wrapper_key} wrapper must contain a document, got {other}"
        ))),
        None => Ok((document, Document::new())),
    }
}

fn take_document(document: &mut Document, key: &str) -> Result<Option<Document>> {
    match document.remove(key) {
        Some(Bson::Document(doc)) => Ok(Some(doc)),
        Some(other) => Err(Error::invalid_argument(format!(
            "{key} must be a document, got {other}"
        ))),
        None => Ok(None),
    }
}
