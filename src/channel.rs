//! The contract between this engine and the transport that actually talks to a server.

use futures_core::future::BoxFuture;
use tokio::sync::watch;

use crate::{
    bson::Document,
    client::session::cluster_time::ClusterTime,
    error::{ErrorKind, Result},
    options::ReadPreference,
};

/// The minimum wire version of a server that understands logical sessions, causal consistency
/// and retryable writes (MongoDB 3.6).
pub(crate) const SESSIONS_WIRE_VERSION: i32 = 6;

/// The newest wire protocol version this engine knows how to speak.
pub(crate) const MAX_SUPPORTED_WIRE_VERSION: i32 = 25;

/// Per-call options handed to [`Channel::send`].
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct SendOptions {
    /// The read preference in effect for this command, if any.
    pub read_preference: Option<ReadPreference>,

    /// Whether this send is a replay of a command that was already sent once.
    pub is_retry: bool,
}

/// An RPC channel to a single targeted server.
///
/// Implementations own connection pooling, authentication and wire encoding. A command handed to
/// [`send`](Channel::send) is fully decorated; the response is returned as is, including
/// responses with `ok: 0`. Only failures to complete the round trip itself should be reported as
/// errors, using an [`ErrorKind::Io`](crate::error::ErrorKind::Io) error.
pub trait Channel: Send + Sync + std::fmt::Debug {
    /// Sends `command` to the `database` and returns the server's reply.
    fn send<'a>(
        &'a self,
        database: &'a str,
        command: Document,
        options: &'a SendOptions,
    ) -> BoxFuture<'a, Result<Document>>;

    /// Attempts to re-establish the connection to the targeted server after a transport failure.
    fn reconnect(&self) -> BoxFuture<'_, Result<()>>;

    /// The minimum wire protocol version supported by the targeted server.
    fn min_wire_version(&self) -> i32;

    /// The maximum wire protocol version supported by the targeted server.
    fn max_wire_version(&self) -> i32;

    /// Whether the targeted server is a member of a replica set.
    fn is_replicated(&self) -> bool;

    /// Whether the targeted server is a routing tier (mongos).
    fn is_routed(&self) -> bool;

    /// The highest cluster time observed by any session sharing this channel.
    fn cluster_time(&self) -> Option<ClusterTime>;

    /// Advances the shared cluster time. Older or equal times are ignored.
    fn advance_cluster_time(&self, to: &ClusterTime);
}

/// Topology facts derived from a channel.
pub(crate) trait ChannelExt: Channel {
    /// Whether the server understands causal consistency and is part of a deployment that can
    /// make use of gossiped cluster times.
    fn supports_cluster_time_gossip(&self) -> bool {
        self.max_wire_version() >= SESSIONS_WIRE_VERSION && (self.is_replicated() || self.is_routed())
    }

    fn supports_retryable_writes(&self) -> bool {
        self.supports_cluster_time_gossip()
    }

    /// Fails when the server only speaks wire versions newer than this engine supports.
    fn check_compatibility(&self) -> Result<()> {
        let min_wire_version = self.min_wire_version();
        if min_wire_version > MAX_SUPPORTED_WIRE_VERSION {
            return Err(ErrorKind::IncompatibleServer {
                message: format!(
                    "server requires wire version {min_wire_version}, but this version of the \
                     engine only supports up to {MAX_SUPPORTED_WIRE_VERSION}"
                ),
            }
            .into());
        }
        Ok(())
    }
}

impl<C: Channel + ?Sized> ChannelExt for C {}

/// A thread-safe, monotonically advancing cluster time shared by every session of a client.
///
/// Intended for use by [`Channel`] implementations to back [`Channel::cluster_time`] and
/// [`Channel::advance_cluster_time`].
#[derive(Debug)]
pub struct ClusterClock {
    sender: watch::Sender<Option<ClusterTime>>,
}

impl Default for ClusterClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterClock {
    /// Creates a clock with no cluster time observed.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// The latest cluster time, if any was observed.
    pub fn get(&self) -> Option<ClusterTime> {
        self.sender.borrow().clone()
    }

    /// Advances to `to` if it is newer than the stored time. Returns whether it changed.
    pub fn advance(&self, to: &ClusterTime) -> bool {
        self.sender.send_if_modified(|current| {
            let newer = current.as_ref().is_none_or(|current| to > current);
            if newer {
                *current = Some(to.clone());
            }
            newer
        })
    }

    /// Returns a receiver that is notified every time the cluster time advances.
    pub fn subscribe(&self) -> watch::Receiver<Option<ClusterTime>> {
        self.sender.subscribe()
    }
}
