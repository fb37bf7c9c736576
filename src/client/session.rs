pub(crate) mod cluster_time;
mod pool;

use std::time::Instant;

use uuid::Uuid;

use crate::{
    bson::{doc, spec::BinarySubtype, Binary, Bson, Document, Timestamp},
    channel::{SendOptions, SESSIONS_WIRE_VERSION},
    db::SessionDatabase,
    error::{Error, Result},
    options::SessionOptions,
    trace::{TracingRepresentation, SESSION_TRACING_EVENT_TARGET},
    Client,
};
pub use cluster_time::ClusterTime;
use cluster_time::TimeTracker;
pub(crate) use pool::ServerSessionPool;

/// A MongoDB client session. This struct represents a logical session used for ordering
/// sequential operations. To create a `ClientSession`, call `start_session` on a `Client`.
///
/// A session tracks the highest operation time and cluster time it has observed and numbers the
/// retryable writes sent through it, so that a replayed write is recognized by the server.
///
/// `ClientSession` instances are not thread safe or fork safe. They can only be used by one
/// thread or process at a time.
#[derive(Debug)]
pub struct ClientSession {
    server_session: ServerSession,
    client: Client,
    is_implicit: bool,
    options: Option<SessionOptions>,
    cluster_time: TimeTracker<ClusterTime>,
    operation_time: TimeTracker<Timestamp>,
    ended: bool,
}

impl ClientSession {
    /// Creates a new `ClientSession` by checking out a corresponding `ServerSession` from the
    /// provided client's session pool.
    pub(crate) fn new(client: Client, options: Option<SessionOptions>, is_implicit: bool) -> Self {
        let server_session = client.inner.session_pool.check_out();
        tracing::trace!(
            target: SESSION_TRACING_EVENT_TARGET,
            lsid = server_session.id.tracing_representation(),
            implicit = is_implicit,
            "Session started"
        );
        Self {
            client,
            server_session,
            is_implicit,
            options,
            cluster_time: TimeTracker::default(),
            operation_time: TimeTracker::default(),
            ended: false,
        }
    }

    /// The client used to create this session.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// The id of this session.
    pub fn id(&self) -> &Document {
        &self.server_session.id
    }

    /// Whether this session was created implicitly by the engine or explicitly by the user.
    pub(crate) fn is_implicit(&self) -> bool {
        self.is_implicit
    }

    /// The highest seen cluster time this session has seen so far.
    /// This will be `None` if this session has not been used in an operation yet.
    pub fn cluster_time(&self) -> Option<&ClusterTime> {
        self.cluster_time.value()
    }

    /// The options used to create this session.
    pub fn options(&self) -> Option<&SessionOptions> {
        self.options.as_ref()
    }

    /// Set the cluster time to the provided one if it is greater than this session's highest
    /// seen cluster time or if this session's cluster time is `None`.
    pub fn advance_cluster_time(&mut self, to: &ClusterTime) {
        self.cluster_time.advance(to);
    }

    /// Advance operation time for this session. If the provided timestamp is earlier than this
    /// session's current operation time, then the operation time is unchanged.
    pub fn advance_operation_time(&mut self, ts: Timestamp) {
        self.operation_time.advance(&ts);
    }

    /// The operation time returned by the last operation executed in this session.
    pub fn operation_time(&self) -> Option<Timestamp> {
        self.operation_time.value().copied()
    }

    /// Whether reads through this session are causally consistent. Explicit sessions default to
    /// causal consistency; implicit sessions only use it when the client requests it.
    pub(crate) fn causal_consistency(&self) -> bool {
        self.options()
            .and_then(|opts| opts.causal_consistency)
            .unwrap_or(!self.is_implicit())
            || self.client.options().causal_consistency
    }

    /// Whether retry-eligible writes through this session are retried.
    pub(crate) fn retry_writes(&self) -> bool {
        self.options()
            .and_then(|opts| opts.retry_writes)
            .unwrap_or(self.client.options().retry_writes)
    }

    /// Whether `end` was already called on this session.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub(crate) fn check_not_ended(&self) -> Result<()> {
        if self.ended {
            return Err(Error::usage("cannot use a session that has already been ended"));
        }
        Ok(())
    }

    /// Returns a handle to the database with the given name whose commands all run through this
    /// session.
    pub fn database(&mut self, name: &str) -> SessionDatabase<'_> {
        let database = self.client.database(name);
        SessionDatabase::new(database, self)
    }

    /// Ends this session, notifying the server that its identifier can be released.
    ///
    /// Failing to reach the server is not an error: the server reaps idle sessions on its own.
    /// Ending a session twice returns a usage error, as does any further use of the session.
    pub async fn end(&mut self) -> Result<()> {
        self.check_not_ended()?;
        self.ended = true;

        let channel = self.client.channel();
        if channel.max_wire_version() >= SESSIONS_WIRE_VERSION {
            let command = doc! { "endSessions": [self.server_session.id.clone()] };
            if let Err(error) = channel
                .send("admin", command, &SendOptions::default())
                .await
            {
                tracing::debug!(
                    target: SESSION_TRACING_EVENT_TARGET,
                    lsid = self.server_session.id.tracing_representation(),
                    error = error.tracing_representation(),
                    "Failed to end session on the server"
                );
            }
        }
        tracing::debug!(
            target: SESSION_TRACING_EVENT_TARGET,
            lsid = self.server_session.id.tracing_representation(),
            "Session ended"
        );
        Ok(())
    }

    /// Marks the server session dirty so that it is discarded instead of pooled.
    pub(crate) fn mark_dirty(&mut self) {
        self.server_session.dirty = true;
    }

    pub(crate) fn update_last_use(&mut self) {
        self.server_session.last_use = Instant::now();
    }

    #[cfg(test)]
    pub(crate) fn txn_number(&self) -> i64 {
        self.server_session.txn_number
    }

    /// Increments the transaction number and returns the new value. The first number handed out
    /// by a session is 1.
    pub(crate) fn get_and_increment_txn_number(&mut self) -> i64 {
        self.server_session.txn_number += 1;
        self.server_session.txn_number
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self) -> bool {
        self.server_session.dirty
    }

    #[cfg(test)]
    pub(crate) fn last_use(&self) -> Instant {
        self.server_session.last_use
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.ended {
            return;
        }
        let id = self.server_session.id.clone();
        let idle = self.server_session.last_use.elapsed();
        let kept = self
            .client
            .inner
            .session_pool
            .check_in(self.server_session.clone());
        tracing::trace!(
            target: SESSION_TRACING_EVENT_TARGET,
            lsid = id.tracing_representation(),
            pooled = kept,
            sinceLastUseMS = idle.as_millis(),
            "Session checked in"
        );
    }
}

/// Client side abstraction of a server session. These are pooled and may be associated with
/// multiple `ClientSession`s over the course of their lifetime.
#[derive(Clone, Debug)]
pub(crate) struct ServerSession {
    /// The id of the server session to which this corresponds.
    id: Document,

    /// The last time an operation was executed with this session.
    last_use: Instant,

    /// Whether a network error was encountered while using this session.
    dirty: bool,

    /// A monotonically increasing transaction number for this session.
    txn_number: i64,
}

impl ServerSession {
    /// Creates a new session, generating the id client side.
    fn new() -> Self {
        let binary = Bson::Binary(Binary {
            subtype: BinarySubtype::Uuid,
            bytes: Uuid::new_v4().as_bytes().to_vec(),
        });

        Self {
            id: doc! { "id": binary },
            last_use: Instant::now(),
            dirty: false,
            txn_number: 0,
        }
    }
}
