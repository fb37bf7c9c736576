mod executor;
pub mod options;
pub mod session;

use std::sync::Arc;

use crate::{
    bson::doc,
    channel::{Channel, SendOptions, SESSIONS_WIRE_VERSION},
    db::Database,
    error::Result,
    options::{ClientOptions, SessionOptions},
    trace::{TracingRepresentation, SESSION_TRACING_EVENT_TARGET},
    ClientSession,
};

pub(crate) use executor::check_ok;
use session::ServerSessionPool;

/// `endSessions` accepts at most this many ids per command.
const END_SESSIONS_BATCH_SIZE: usize = 10_000;

/// This is the main entry point for the API. A `Client` wraps a [`Channel`] to a single server
/// and runs every command through the session, time-tracking and retry machinery.
///
/// `Client` uses [`std::sync::Arc`](https://doc.rust-lang.org/std/sync/struct.Arc.html) internally,
/// so it can safely be shared across threads or async tasks. For example:
///
/// ```rust
/// # use std::sync::Arc;
/// # use mongodb_session_engine::{bson::doc, channel::Channel, Client, error::Result};
/// #
/// # async fn start_workers(channel: Arc<dyn Channel>) -> Result<()> {
/// let client = Client::new(channel);
///
/// for i in 0..5 {
///     let client_ref = client.clone();
///
///     tokio::task::spawn(async move {
///         let db = client_ref.database(&format!("db{}", i));
///         let _ = db.run_command(doc! { "ping": 1 }, None).await;
///     });
/// }
/// #
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[allow(dead_code, unreachable_code, clippy::diverging_sub_expression)]
const _: fn() = || {
    fn assert_send<T: Send>(_t: T) {}
    fn assert_sync<T: Sync>(_t: T) {}

    let _c: super::Client = todo!();
    assert_send(_c);
    assert_sync(_c);
};

#[derive(Debug)]
struct ClientInner {
    channel: Arc<dyn Channel>,
    options: ClientOptions,
    session_pool: ServerSessionPool,
}

impl Client {
    /// Creates a new `Client` with the default options.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::from_parts(channel, ClientOptions::default())
    }

    /// Creates a new `Client` with the given options, validating them first.
    pub fn with_options(channel: Arc<dyn Channel>, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::from_parts(channel, options))
    }

    fn from_parts(channel: Arc<dyn Channel>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                channel,
                options,
                session_pool: ServerSessionPool::new(),
            }),
        }
    }

    /// The options this client was created with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Gets a handle to a database specified by `name`.
    ///
    /// This method does not send or receive anything across the wire to the database, so it can be
    /// used repeatedly without incurring any costs from I/O.
    pub fn database(&self, name: &str) -> Database {
        Database::new(self.clone(), name)
    }

    /// Starts a new explicit [`ClientSession`].
    pub fn start_session(
        &self,
        options: impl Into<Option<SessionOptions>>,
    ) -> Result<ClientSession> {
        let options = options.into();
        if let Some(ref options) = options {
            options.validate()?;
        }
        Ok(ClientSession::new(self.clone(), options, false))
    }

    pub(crate) fn start_implicit_session(&self) -> ClientSession {
        ClientSession::new(self.clone(), None, true)
    }

    pub(crate) fn channel(&self) -> &dyn Channel {
        self.inner.channel.as_ref()
    }

    /// Ends every pooled server session. Sessions still in use are unaffected and return to the
    /// pool when they are dropped.
    ///
    /// This is best effort: failing to reach the server is logged and otherwise ignored.
    pub async fn end_pooled_sessions(&self) {
        let session_ids = self.inner.session_pool.drain_session_ids();
        if session_ids.is_empty() || self.channel().max_wire_version() < SESSIONS_WIRE_VERSION {
            return;
        }
        for chunk in session_ids.chunks(END_SESSIONS_BATCH_SIZE) {
            let command = doc! { "endSessions": chunk.to_vec() };
            if let Err(error) = self
                .channel()
                .send("admin", command, &SendOptions::default())
                .await
            {
                tracing::debug!(
                    target: SESSION_TRACING_EVENT_TARGET,
                    count = chunk.len(),
                    error = error.tracing_representation(),
                    "Failed to end pooled sessions"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pool_contains(&self, id: &crate::bson::Document) -> bool {
        self.inner.session_pool.contains(id)
    }
}
