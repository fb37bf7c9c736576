use std::{fmt, sync::Arc};

use crate::{bulk::BulkWrite, db::Database, Client};

/// `Collection` is the client-side abstraction of a MongoDB Collection. Writes are queued on a
/// [`BulkWrite`] obtained from [`Collection::initialize_ordered_bulk_op`] or
/// [`Collection::initialize_unordered_bulk_op`].
///
/// `Collection` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html) internally,
/// so it can safely be shared across threads or async tasks.
#[derive(Clone, Debug)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

#[derive(Debug)]
struct CollectionInner {
    db: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(db: Database, name: &str) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                db,
                name: name.to_string(),
            }),
        }
    }

    /// Get the `Client` that this collection descended from.
    pub fn client(&self) -> &Client {
        self.inner.db.client()
    }

    /// Gets the name of the `Collection`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the namespace of the `Collection`.
    ///
    /// The namespace of a MongoDB collection is the concatenation of the name of the database
    /// containing it, the '.' character, and the name of the collection itself. For example, if a
    /// collection named "bar" is created in a database named "foo", the namespace of the collection
    /// is "foo.bar".
    pub fn namespace(&self) -> Namespace {
        Namespace {
            db: self.inner.db.name().into(),
            coll: self.name().into(),
        }
    }

    /// The database this collection belongs to.
    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    /// Starts a bulk write whose operations are applied in order, stopping at the first batch
    /// that reports a write error.
    pub fn initialize_ordered_bulk_op(&self) -> BulkWrite {
        BulkWrite::new(self.clone(), true)
    }

    /// Starts a bulk write whose operations may be applied in any order. Every operation is
    /// attempted even when some of them fail.
    pub fn initialize_unordered_bulk_op(&self) -> BulkWrite {
        BulkWrite::new(self.clone(), false)
    }
}

/// A struct modeling the canonical name for a collection in MongoDB.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// The name of the database associated with this namespace.
    pub db: String,

    /// The name of the collection this namespace corresponds to.
    pub coll: String,
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}
