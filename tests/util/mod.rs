use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
        Mutex,
    },
};

use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use mongodb_session_engine::{
    bson::{doc, Bson, Document, Timestamp},
    channel::{Channel, ClusterClock, SendOptions},
    error::Result,
    ClusterTime,
};

/// A single-node replica set held in memory. Inserted documents are stored per namespace and
/// `count` reports how many are stored. Like a real server, a write that carries an already
/// applied `(lsid, txnNumber)` is acknowledged without being applied again.
#[derive(Debug, Default)]
pub struct InMemoryServer {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    applied: Mutex<HashSet<(String, i64)>>,
    ended_sessions: Mutex<Vec<Document>>,
    retries: Mutex<Vec<Document>>,
    drop_next_reply: AtomicBool,
    clock: ClusterClock,
    tick: AtomicU32,
}

impl InMemoryServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Applies the next command but loses its reply, as if the connection dropped.
    pub fn drop_next_reply(&self) {
        self.drop_next_reply.store(true, Ordering::SeqCst);
    }

    pub fn stored(&self, db: &str, coll: &str) -> Vec<Document> {
        self.collections
            .lock()
            .unwrap()
            .get(&format!("{db}.{coll}"))
            .cloned()
            .unwrap_or_default()
    }

    pub fn ended_sessions(&self) -> Vec<Document> {
        self.ended_sessions.lock().unwrap().clone()
    }

    /// Commands that were sent as retries.
    pub fn retries(&self) -> Vec<Document> {
        self.retries.lock().unwrap().clone()
    }

    fn next_time(&self) -> Timestamp {
        Timestamp {
            time: 1_700_000_000,
            increment: self.tick.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    fn handle(&self, db: &str, command: &Document) -> Document {
        let name = command.keys().next().cloned().unwrap_or_default();
        let operation_time = self.next_time();
        let mut reply = match name.as_str() {
            "insert" => self.insert(db, command),
            "count" => {
                let coll = command.get_str("count").unwrap_or_default();
                doc! { "ok": 1, "n": self.stored(db, coll).len() as i64 }
            }
            "endSessions" => {
                let ids = command.get_array("endSessions").cloned().unwrap_or_default();
                self.ended_sessions
                    .lock()
                    .unwrap()
                    .extend(ids.into_iter().filter_map(|id| id.as_document().cloned()));
                doc! { "ok": 1 }
            }
            _ => doc! { "ok": 1 },
        };
        reply.insert("operationTime", operation_time);
        reply.insert(
            "$clusterTime",
            doc! {
                "clusterTime": operation_time,
                "signature": { "hash": Bson::Int64(0), "keyId": Bson::Int64(0) },
            },
        );
        reply
    }

    fn insert(&self, db: &str, command: &Document) -> Document {
        let coll = command.get_str("insert").unwrap_or_default();
        let documents: Vec<Document> = command
            .get_array("documents")
            .map(|docs| docs.iter().filter_map(Bson::as_document).cloned().collect())
            .unwrap_or_default();
        let n = documents.len() as i64;

        let lsid = command.get_document("lsid");
        if let (Ok(lsid), Ok(txn_number)) = (lsid, command.get_i64("txnNumber")) {
            let key = (format!("{lsid:?}"), txn_number);
            if !self.applied.lock().unwrap().insert(key) {
                return doc! { "ok": 1, "n": n };
            }
        }

        self.collections
            .lock()
            .unwrap()
            .entry(format!("{db}.{coll}"))
            .or_default()
            .extend(documents);
        doc! { "ok": 1, "n": n }
    }
}

impl Channel for InMemoryServer {
    fn send<'a>(
        &'a self,
        database: &'a str,
        command: Document,
        options: &'a SendOptions,
    ) -> BoxFuture<'a, Result<Document>> {
        async move {
            if options.is_retry {
                self.retries.lock().unwrap().push(command.clone());
            }
            let reply = self.handle(database, &command);
            if self.drop_next_reply.swap(false, Ordering::SeqCst) {
                return Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset).into());
            }
            Ok(reply)
        }
        .boxed()
    }

    fn reconnect(&self) -> BoxFuture<'_, Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn min_wire_version(&self) -> i32 {
        0
    }

    fn max_wire_version(&self) -> i32 {
        17
    }

    fn is_replicated(&self) -> bool {
        true
    }

    fn is_routed(&self) -> bool {
        false
    }

    fn cluster_time(&self) -> Option<ClusterTime> {
        self.clock.get()
    }

    fn advance_cluster_time(&self, to: &ClusterTime) {
        self.clock.advance(to);
    }
}
