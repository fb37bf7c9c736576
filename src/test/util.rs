use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use futures_core::future::BoxFuture;
use futures_util::FutureExt;

use crate::{
    bson::{doc, Bson, Document, Timestamp},
    channel::{Channel, ClusterClock, SendOptions},
    client::session::cluster_time::ClusterTime,
    error::{Error, Result},
    options::ClientOptions,
    Client,
};

/// A scripted reply of a [`MockChannel`].
#[derive(Clone, Debug)]
enum MockReply {
    Reply(Document),
    NetworkError,
}

/// A command as it was handed to the channel.
#[derive(Clone, Debug)]
pub(crate) struct SentCommand {
    pub(crate) db: String,
    pub(crate) command: Document,
    pub(crate) options: SendOptions,
}

impl SentCommand {
    pub(crate) fn name(&self) -> &str {
        self.command.keys().next().map(String::as_str).unwrap_or_default()
    }
}

/// A channel that answers with scripted replies and records everything it is sent. When the
/// script runs out, write commands are acknowledged as fully successful and anything else gets
/// `{ ok: 1 }`.
#[derive(Debug)]
pub(crate) struct MockChannel {
    replies: Mutex<VecDeque<MockReply>>,
    reconnects: Mutex<VecDeque<bool>>,
    sent: Mutex<Vec<SentCommand>>,
    reconnect_count: AtomicUsize,
    min_wire_version: AtomicI32,
    max_wire_version: AtomicI32,
    is_replicated: bool,
    is_routed: bool,
    clock: ClusterClock,
}

impl MockChannel {
    /// A replica set member of a modern server.
    pub(crate) fn replica_set() -> Arc<Self> {
        Arc::new(Self::with_topology(true, false, 17))
    }

    /// A standalone server: no gossip, no retryable writes.
    pub(crate) fn standalone() -> Arc<Self> {
        Arc::new(Self::with_topology(false, false, 17))
    }

    pub(crate) fn with_topology(
        is_replicated: bool,
        is_routed: bool,
        max_wire_version: i32,
    ) -> Self {
        Self {
            replies: Default::default(),
            reconnects: Default::default(),
            sent: Default::default(),
            reconnect_count: AtomicUsize::new(0),
            min_wire_version: AtomicI32::new(0),
            max_wire_version: AtomicI32::new(max_wire_version),
            is_replicated,
            is_routed,
            clock: ClusterClock::new(),
        }
    }

    pub(crate) fn client(self: &Arc<Self>) -> Client {
        Client::new(self.clone())
    }

    pub(crate) fn client_with_options(self: &Arc<Self>, options: ClientOptions) -> Client {
        Client::with_options(self.clone(), options).unwrap()
    }

    pub(crate) fn push_reply(&self, reply: Document) {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::Reply(reply));
    }

    pub(crate) fn push_network_error(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::NetworkError);
    }

    /// Makes the next reconnect attempt fail.
    pub(crate) fn fail_next_reconnect(&self) {
        self.reconnects.lock().unwrap().push_back(false);
    }

    pub(crate) fn set_min_wire_version(&self, min_wire_version: i32) {
        self.min_wire_version
            .store(min_wire_version, Ordering::SeqCst);
    }

    pub(crate) fn set_max_wire_version(&self, max_wire_version: i32) {
        self.max_wire_version
            .store(max_wire_version, Ordering::SeqCst);
    }

    pub(crate) fn sent_commands(&self) -> Vec<SentCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// The sent commands with the given command name.
    pub(crate) fn sent_named(&self, name: &str) -> Vec<SentCommand> {
        self.sent_commands()
            .into_iter()
            .filter(|sent| sent.name() == name)
            .collect()
    }

    pub(crate) fn reconnect_count(&self) -> usize {
        self.reconnect_count.load(Ordering::SeqCst)
    }
}

/// A fully successful reply to `command`.
pub(crate) fn success_reply(command: &Document) -> Document {
    let count = |field: &str| {
        command
            .get_array(field)
            .map(|ops| ops.len() as i64)
            .unwrap_or(0)
    };
    match command.keys().next().map(String::as_str) {
        Some("insert") => doc! { "ok": 1, "n": count("documents") },
        Some("update") => {
            let n = count("updates");
            doc! { "ok": 1, "n": n, "nModified": n }
        }
        Some("delete") => doc! { "ok": 1, "n": count("deletes") },
        _ => doc! { "ok": 1 },
    }
}

/// A cluster time document as a server would send it.
pub(crate) fn cluster_time_doc(time: u32, increment: u32) -> Document {
    doc! {
        "clusterTime": Timestamp { time, increment },
        "signature": { "hash": Bson::Int64(0), "keyId": Bson::Int64(time as i64) },
    }
}

pub(crate) fn cluster_time(time: u32, increment: u32) -> ClusterTime {
    ClusterTime::new(
        Timestamp { time, increment },
        doc! { "hash": Bson::Int64(0), "keyId": Bson::Int64(time as i64) },
    )
}

impl Channel for MockChannel {
    fn send<'a>(
        &'a self,
        database: &'a str,
        command: Document,
        options: &'a SendOptions,
    ) -> BoxFuture<'a, Result<Document>> {
        async move {
            self.sent.lock().unwrap().push(SentCommand {
                db: database.to_string(),
                command: command.clone(),
                options: options.clone(),
            });
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(MockReply::Reply(reply)) => Ok(reply),
                Some(MockReply::NetworkError) => {
                    Err(Error::from(std::io::ErrorKind::ConnectionReset))
                }
                None => Ok(success_reply(&command)),
            }
        }
        .boxed()
    }

    fn reconnect(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.reconnect_count.fetch_add(1, Ordering::SeqCst);
            match self.reconnects.lock().unwrap().pop_front() {
                Some(false) => Err(Error::from(std::io::ErrorKind::ConnectionRefused)),
                _ => Ok(()),
            }
        }
        .boxed()
    }

    fn min_wire_version(&self) -> i32 {
        self.min_wire_version.load(Ordering::SeqCst)
    }

    fn max_wire_version(&self) -> i32 {
        self.max_wire_version.load(Ordering::SeqCst)
    }

    fn is_replicated(&self) -> bool {
        self.is_replicated
    }

    fn is_routed(&self) -> bool {
        self.is_routed
    }

    fn cluster_time(&self) -> Option<ClusterTime> {
        self.clock.get()
    }

    fn advance_cluster_time(&self, to: &ClusterTime) {
        self.clock.advance(to);
    }
}
