
use typed_builder::TypedBuilder;

use crate::{
    concern::{ReadConcern, WriteConcern},
    error::{Error, Result},
    selection_criteria::ReadPreference,
};

/// The default maximum number of write operations sent in a single batch.
pub const DEFAULT_MAX_WRITE_BATCH_SIZE: usize = 1000;

/// The default maximum cumulative encoded size of a single batch, in bytes.
pub const DEFAULT_MAX_BATCH_SIZE_BYTES: usize = 16 * 1024 * 1024;

/// Contains the options that can be used to create a new [`Client`](crate::Client).
///
/// Every field has a default, so `ClientOptions::default()` describes a client that retries
/// writes once, assigns transaction numbers, attaches implicit sessions and does not request
/// causal consistency unless a session asks for it.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
#[non_exhaustive]
pub struct ClientOptions {
    /// The default for [`SessionOptions::retry_writes`].
    #[builder(default = true)]
    pub retry_writes: bool,

    /// Whether retry-eligible writes are assigned a transaction number at all.
    #[builder(default = true)]
    pub assign_txn_numbers: bool,

    /// Global switch for replaying failed retry-eligible writes.
    #[builder(default = true)]
    pub retry_on_error: bool,

    /// How many times a retry-eligible write may be replayed after its first attempt.
    #[builder(default = 1)]
    pub max_retry_attempts: u32,

    /// Whether commands run without an explicit session get one attached implicitly.
    #[builder(default = true)]
    pub implicit_sessions: bool,

    /// Requests causally consistent reads for every session, including implicit ones.
    #[builder(default = false)]
    pub causal_consistency: bool,

    /// The maximum number of operations in a single write batch.
    #[builder(default = DEFAULT_MAX_WRITE_BATCH_SIZE)]
    pub max_write_batch_size: usize,

    /// The maximum cumulative encoded size of a single write batch.
    #[builder(default = DEFAULT_MAX_BATCH_SIZE_BYTES)]
    pub max_batch_size_bytes: usize,

    /// The default read preference for commands run through this client.
    #[builder(default, setter(into, strip_option))]
    pub read_preference: Option<ReadPreference>,

    /// The default read concern for sessions started from this client.
    #[builder(default, setter(into, strip_option))]
    pub read_concern: Option<ReadConcern>,

    /// The default write concern for bulk writes executed through this client.
    #[builder(default, setter(into, strip_option))]
    pub write_concern: Option<WriteConcern>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_write_batch_size == 0 {
            return Err(Error::invalid_argument(
                "max_write_batch_size must be greater than zero",
            ));
        }
        if self.max_batch_size_bytes == 0 {
            return Err(Error::invalid_argument(
                "max_batch_size_bytes must be greater than zero",
            ));
        }
        if let Some(ref write_concern) = self.write_concern {
            write_concern.validate()?;
        }
        Ok(())
    }
}

/// Contains the options that can be used to create a new
/// [`ClientSession`](crate::ClientSession).
#[derive(Clone, Debug, Default, PartialEq, TypedBuilder)]
#[builder(field_defaults(default, setter(into, strip_option)))]
#[non_exhaustive]
pub struct SessionOptions {
    /// If true, reads performed through this session observe all operations that were
    /// previously acknowledged through it. Defaults to true for explicit sessions.
    pub causal_consistency: Option<bool>,

    /// Whether retry-eligible writes through this session are retried. Defaults to the
    /// client's [`ClientOptions::retry_writes`].
    pub retry_writes: Option<bool>,

    /// The default read preference for commands run through this session.
    pub read_preference: Option<ReadPreference>,

    /// The default read concern for commands run through this session.
    pub read_concern: Option<ReadConcern>,

    /// The default write concern for bulk writes executed through this session.
    pub write_concern: Option<WriteConcern>,
}

impl SessionOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(ref write_concern) = self.write_concern {
            write_concern.validate()?;
        }
        Ok(())
    }
}
