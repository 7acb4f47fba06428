//! SQLite document store tests

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use tripsync::backend::collab::Coordinator;
use tripsync::backend::documents::{DocumentStore, SqliteDocumentStore};
use tripsync::backend::error::SyncError;
use tripsync::backend::server::SyncContext;
use tripsync::shared::{OperationKind, SessionContext, SyncMessage, SyncOp};

use crate::common::*;

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("trips.db").display())
}

fn parse(snapshot: &[u8]) -> Value {
    serde_json::from_slice(snapshot).unwrap()
}

#[tokio::test]
async fn test_snapshots_survive_reconnect() {
    let dir = TempDir::new().unwrap();
    let url = database_url(&dir);

    let store = SqliteDocumentStore::connect(&url).await.unwrap();
    store.create("t1", br#"{"name":"Porto"}"#).await.unwrap();
    store.save("t1", br#"{"name":"Lisbon"}"#).await.unwrap();
    assert!(store.updated_at("t1").await.unwrap().is_some());
    drop(store);

    let reopened = SqliteDocumentStore::connect(&url).await.unwrap();
    assert_eq!(parse(&reopened.read("t1").await.unwrap()), json!({"name": "Lisbon"}));
}

#[tokio::test]
async fn test_missing_and_duplicate_documents() {
    let store = SqliteDocumentStore::connect("sqlite::memory:").await.unwrap();

    assert_matches!(store.read("nope").await, Err(SyncError::DocumentNotFound { .. }));
    assert_eq!(store.updated_at("nope").await.unwrap(), None);

    store.create("t1", b"{}").await.unwrap();
    assert!(store.create("t1", b"{}").await.is_err());
}

#[tokio::test]
async fn test_coordinator_saves_to_sqlite() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteDocumentStore::connect(&database_url(&dir)).await.unwrap());
    store.create("t1", br#"{"name":"Porto","log":[]}"#).await.unwrap();

    let harness = Harness::new();
    let context = SyncContext::new(
        harness.bus.clone(),
        harness.sessions.clone(),
        store.clone(),
        harness.config.clone(),
    );
    let mut responses = harness.responses("t1").await;
    let handle = Coordinator::init(context, "t1").await.unwrap().run();

    let alice = SessionContext::connect("t1", "alice");
    for entry in ["a", "b"] {
        harness
            .send(&SyncMessage::update(
                &alice,
                OperationKind::Generic,
                vec![SyncOp::add("/log/-", json!(entry))],
            ))
            .await;
        next_response(&mut responses).await;
    }
    handle.stop();
    handle.stopped().await;

    assert_eq!(
        parse(&store.read("t1").await.unwrap()),
        json!({"name": "Porto", "log": ["a", "b"]})
    );
}
