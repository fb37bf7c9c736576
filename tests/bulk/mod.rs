use mongodb_session_engine::{
    bson::doc,
    error::ErrorKind,
    options::{ClientOptions, SessionOptions},
    Client,
};
use pretty_assertions::assert_eq;

use crate::util::InMemoryServer;

#[tokio::test]
async fn large_unordered_bulk_is_applied_and_counted() {
    let server = InMemoryServer::new();
    let client = Client::new(server.clone());
    let options = SessionOptions::builder().causal_consistency(true).build();
    let mut session = client.start_session(options).unwrap();

    let coll = client.database("app").collection("events");
    let mut bulk = coll.initialize_unordered_bulk_op();
    for i in 0..2500 {
        bulk.insert(doc! { "i": i }).unwrap();
    }
    assert_eq!(bulk.batches().unwrap().len(), 3);

    let result = bulk.execute_with_session(None, &mut session).await.unwrap();
    assert_eq!(result.n_inserted, 2500);
    assert_eq!(result.batch_count(), 3);

    let count = session
        .database("app")
        .run_command(doc! { "count": "events" })
        .await
        .unwrap();
    assert_eq!(count.get_i64("n").unwrap(), 2500);
    assert!(session.operation_time().is_some());
    assert_eq!(
        session.cluster_time().map(|time| time.timestamp()),
        session.operation_time()
    );

    let stored = server.stored("app", "events");
    assert_eq!(stored.len(), 2500);
    assert_eq!(stored[1234].get_i32("i").unwrap(), 1234);
}

#[tokio::test]
async fn lost_reply_is_retried_without_duplicates() {
    let server = InMemoryServer::new();
    let client = Client::new(server.clone());
    let coll = client.database("app").collection("events");

    let mut bulk = coll.initialize_ordered_bulk_op();
    for i in 0..10 {
        bulk.insert(doc! { "i": i }).unwrap();
    }
    server.drop_next_reply();

    let result = bulk.execute(None).await.unwrap();
    assert_eq!(result.n_inserted, 10);
    assert_eq!(server.stored("app", "events").len(), 10);
    assert_eq!(server.retries().len(), 1);
}

#[tokio::test]
async fn lost_reply_without_retries_surfaces_error() {
    let server = InMemoryServer::new();
    let client = Client::with_options(
        server.clone(),
        ClientOptions::builder().retry_writes(false).build(),
    )
    .unwrap();
    let coll = client.database("app").collection("events");

    let mut bulk = coll.initialize_ordered_bulk_op();
    bulk.insert(doc! { "i": 0 }).unwrap();
    server.drop_next_reply();

    let error = bulk.execute(None).await.unwrap_err();
    assert!(matches!(*error.kind, ErrorKind::Io(..)));
    assert!(server.retries().is_empty());
    // The write was applied even though its reply was lost.
    assert_eq!(server.stored("app", "events").len(), 1);
}
