use mongodb_session_engine::{bson::doc, Client};
use pretty_assertions::assert_eq;

use crate::util::InMemoryServer;

#[tokio::test]
async fn ended_sessions_are_reported_to_the_server() {
    let server = InMemoryServer::new();
    let client = Client::new(server.clone());

    let mut session = client.start_session(None).unwrap();
    let id = session.id().clone();
    session
        .database("app")
        .run_command(doc! { "ping": 1 })
        .await
        .unwrap();
    session.end().await.unwrap();

    assert_eq!(server.ended_sessions(), vec![id]);
    assert!(session.end().await.unwrap_err().is_usage_error());
}

#[tokio::test]
async fn pooled_sessions_are_reused_then_ended() {
    let server = InMemoryServer::new();
    let client = Client::new(server.clone());

    let db = client.database("app");
    db.run_command(doc! { "ping": 1 }, None).await.unwrap();
    db.run_command(doc! { "ping": 1 }, None).await.unwrap();

    client.end_pooled_sessions().await;
    assert_eq!(server.ended_sessions().len(), 1);

    // Nothing left to end.
    client.end_pooled_sessions().await;
    assert_eq!(server.ended_sessions().len(), 1);
}

#[tokio::test]
async fn sessions_share_the_client_cluster_time() {
    let server = InMemoryServer::new();
    let client = Client::new(server.clone());

    let mut first = client.start_session(None).unwrap();
    first
        .database("app")
        .run_command(doc! { "ping": 1 })
        .await
        .unwrap();
    let observed = first.cluster_time().cloned().unwrap();

    let mut second = client.start_session(None).unwrap();
    assert_eq!(second.cluster_time(), None);
    second
        .database("app")
        .run_command(doc! { "ping": 1 })
        .await
        .unwrap();
    assert!(second.cluster_time().unwrap() > &observed);
}
