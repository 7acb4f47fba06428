//! Coordinator integration tests: ordering, teardown, counter recovery and
//! degraded paths, driven through the bus the way clients drive them

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tripsync::backend::collab::{Coordinator, CoordinatorState};
use tripsync::backend::error::SyncError;
use tripsync::backend::realtime::MessageBus;
use tripsync::backend::sessions::SessionStore;
use tripsync::shared::{JoinPayload, OperationKind, SessionContext, SyncMessage, SyncOp, SyncPayload};

use crate::common::*;

fn append(session: &SessionContext, entry: &str) -> SyncMessage {
    SyncMessage::update(
        session,
        OperationKind::Generic,
        vec![SyncOp::add("/log/-", json!(entry))],
    )
}

fn logged_entry(message: &SyncMessage) -> String {
    match &message.payload {
        SyncPayload::Update(update) => update.ops[0].value.as_str().unwrap().to_string(),
        other => panic!("expected update, got {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_updates_get_gap_free_counters_in_order() {
    let harness = Arc::new(Harness::new());
    harness.seed("t1", json!({"log": []})).await;
    let mut responses = harness.responses("t1").await;
    let handle = Coordinator::init(harness.context(), "t1").await.unwrap().run();

    const CLIENTS: usize = 4;
    const PER_CLIENT: usize = 25;
    let mut clients = Vec::new();
    for client in 0..CLIENTS {
        let harness = Arc::clone(&harness);
        clients.push(tokio::spawn(async move {
            let session = SessionContext::connect("t1", format!("member-{}", client));
            for n in 0..PER_CLIENT {
                harness.send(&append(&session, &format!("{}-{}", client, n))).await;
                tokio::task::yield_now().await;
            }
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    let mut counters = Vec::new();
    let mut entries = Vec::new();
    for _ in 0..CLIENTS * PER_CLIENT {
        let response = next_response(&mut responses).await;
        counters.push(response.counter.unwrap());
        entries.push(logged_entry(&response));
    }

    let expected: Vec<u64> = (1..=(CLIENTS * PER_CLIENT) as u64).collect();
    assert_eq!(counters, expected);

    // The stored log is in broadcast order.
    let stored = harness.documents.get_json("t1").await.unwrap();
    assert_eq!(stored["log"], json!(entries));

    handle.stop();
    handle.stopped().await;
}

#[tokio::test]
async fn test_two_coordinators_never_both_receive_a_request() {
    let harness = Harness::new();
    harness.seed("t1", json!({"log": []})).await;
    let mut responses = harness.responses("t1").await;

    // Simulates two spawners racing for the same document.
    let first = Coordinator::init(harness.context(), "t1").await.unwrap().run();
    let second = Coordinator::init(harness.context(), "t1").await.unwrap().run();

    let alice = SessionContext::connect("t1", "alice");
    for n in 0..20 {
        harness.send(&append(&alice, &n.to_string())).await;
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        seen.push(logged_entry(&next_response(&mut responses).await));
    }
    assert_no_response(&mut responses, Duration::from_millis(100)).await;

    let unique: BTreeSet<&String> = seen.iter().collect();
    assert_eq!(unique.len(), 20, "a request was applied twice: {:?}", seen);

    for handle in [first, second] {
        handle.stop();
        handle.stopped().await;
    }
}

#[tokio::test]
async fn test_last_leave_stops_and_deletes_counter() {
    let harness = Harness::new();
    harness.seed("t1", json!({"name": "Porto"})).await;
    let mut responses = harness.responses("t1").await;

    let alice = SessionContext::connect("t1", "alice");
    let bob = SessionContext::connect("t1", "bob");
    harness.sessions.add_session_context(&alice).await.unwrap();
    harness.sessions.add_session_context(&bob).await.unwrap();

    let handle = Coordinator::init(harness.context(), "t1").await.unwrap().run();
    harness.send(&append(&alice, "x")).await;
    next_response(&mut responses).await;
    assert_eq!(harness.sessions.get_counter("t1").await.unwrap(), Some(2));

    // Not the last member: stamped and broadcast.
    harness.send(&SyncMessage::leave(&bob)).await;
    let leave = next_response(&mut responses).await;
    assert_eq!(leave.counter, Some(2));
    assert_eq!(leave.payload, SyncPayload::Leave);
    assert_eq!(handle.state(), CoordinatorState::Running);

    // Last member: no broadcast, coordinator stops.
    harness.send(&SyncMessage::leave(&alice)).await;
    tokio::time::timeout(RECV_TIMEOUT, handle.stopped()).await.unwrap();

    assert!(handle.is_stopped());
    assert_eq!(harness.sessions.get_counter("t1").await.unwrap(), None);
    assert_no_response(&mut responses, Duration::from_millis(50)).await;
    // Only the test's own response subscription is left.
    assert_eq!(harness.bus.subscriber_count(), 1);
}

#[tokio::test]
async fn test_new_coordinator_resumes_from_stored_counter() {
    let harness = Harness::new();
    harness.seed("t1", json!({"log": []})).await;
    let mut responses = harness.responses("t1").await;
    let alice = SessionContext::connect("t1", "alice");

    let first = Coordinator::init(harness.context(), "t1").await.unwrap().run();
    for n in 0..3 {
        harness.send(&append(&alice, &n.to_string())).await;
        next_response(&mut responses).await;
    }

    // As if the first coordinator had crashed while its counter was still live.
    let replacement = Coordinator::init(harness.context(), "t1").await.unwrap();
    assert_eq!(replacement.next_counter(), 4);
    drop(replacement);

    first.stop();
    first.stopped().await;

    harness.sessions.set_counter("t1", 41).await;
    let resumed = Coordinator::init(harness.context(), "t1").await.unwrap().run();
    harness.send(&append(&alice, "after restart")).await;
    assert_eq!(next_response(&mut responses).await.counter, Some(41));

    resumed.stop();
    resumed.stopped().await;
}

#[tokio::test]
async fn test_store_failure_during_init_is_fatal() {
    let harness = Harness::new();
    harness.seed("t1", json!({})).await;
    let sessions = FlakySessionStore::new();
    sessions.fail_get_counter.store(true, Ordering::SeqCst);

    let result = Coordinator::init(harness.context_with_sessions(sessions), "t1").await;

    assert_matches!(result.err(), Some(SyncError::StoreError { .. }));
    assert_eq!(harness.bus.subscriber_count(), 0);
}

#[tokio::test]
async fn test_patch_failure_keeps_counter_and_marks_error() {
    let harness = Harness::new();
    harness.seed("t1", json!({"name": "Porto"})).await;
    let mut responses = harness.responses("t1").await;
    let handle = Coordinator::init(harness.context(), "t1").await.unwrap().run();
    let alice = SessionContext::connect("t1", "alice");

    harness
        .send(&SyncMessage::update(
            &alice,
            OperationKind::Generic,
            vec![
                SyncOp::replace("/name", json!("Lisbon")),
                SyncOp::remove("/missing"),
            ],
        ))
        .await;
    let failed = next_response(&mut responses).await;
    assert_eq!(failed.counter, Some(1));
    assert!(failed.error.is_some());
    assert_eq!(harness.documents.save_count("t1").await, 0);

    harness
        .send(&SyncMessage::update(
            &alice,
            OperationKind::Generic,
            vec![SyncOp::replace("/name", json!("Faro"))],
        ))
        .await;
    let applied = next_response(&mut responses).await;
    assert_eq!(applied.counter, Some(2));
    assert_eq!(applied.error, None);
    assert_eq!(harness.documents.get_json("t1").await, Some(json!({"name": "Faro"})));

    handle.stop();
    handle.stopped().await;
}

#[tokio::test]
async fn test_join_through_ingest_carries_snapshot_and_members() {
    let harness = Harness::new();
    harness.seed("t1", json!({"name": "Porto"})).await;
    let mut responses = harness.responses("t1").await;
    let alice = SessionContext::connect("t1", "alice");
    let bob = SessionContext::connect("t1", "bob");
    harness.sessions.add_session_context(&alice).await.unwrap();

    let handle = Coordinator::init(harness.context(), "t1").await.unwrap().run();
    harness
        .send(&SyncMessage::update(
            &alice,
            OperationKind::Generic,
            vec![SyncOp::replace("/name", json!("Lisbon"))],
        ))
        .await;
    harness.send(&SyncMessage::join(&bob)).await;

    next_response(&mut responses).await;
    let join = next_response(&mut responses).await;
    assert_eq!(join.counter, Some(2));
    assert_eq!(join.member_id, "bob");
    // The snapshot reflects every update ordered before the join.
    assert_eq!(
        join.payload,
        SyncPayload::Join(JoinPayload {
            snapshot: Some(json!({"name": "Lisbon"})),
            members: vec!["alice".to_string(), "bob".to_string()],
        })
    );

    handle.stop();
    handle.stopped().await;
}

#[tokio::test]
async fn test_bad_requests_do_not_consume_counters() {
    let harness = Harness::new();
    harness.seed("t1", json!({"log": []})).await;
    let mut responses = harness.responses("t1").await;
    let sessions = FlakySessionStore::new();
    let handle = Coordinator::init(harness.context_with_sessions(sessions.clone()), "t1")
        .await
        .unwrap()
        .run();
    let alice = SessionContext::connect("t1", "alice");

    harness.bus.publish("trips.t1.requests", b"not json".to_vec().into()).await.unwrap();
    let other_document = append(&SessionContext::connect("t2", "alice"), "misrouted");
    tripsync::backend::realtime::publish_message(harness.bus.as_ref(), "trips.t1.requests", &other_document)
        .await
        .unwrap();
    sessions.fail_add.store(true, Ordering::SeqCst);
    harness.send(&SyncMessage::join(&alice)).await;

    harness.send(&append(&alice, "first")).await;
    let response = next_response(&mut responses).await;
    assert_eq!(response.counter, Some(1));
    assert_eq!(logged_entry(&response), "first");

    handle.stop();
    handle.stopped().await;
}

#[tokio::test]
async fn test_liveness_keeps_counter_alive() {
    let config = tripsync::shared::SyncConfig::builder()
        .liveness_interval(Duration::from_millis(40))
        .counter_ttl(Duration::from_millis(150))
        .build()
        .unwrap();
    let harness = Harness::with_config(config);
    harness.seed("t1", json!({"log": []})).await;
    let mut responses = harness.responses("t1").await;
    let handle = Coordinator::init(harness.context(), "t1").await.unwrap().run();

    harness.send(&append(&SessionContext::connect("t1", "alice"), "x")).await;
    next_response(&mut responses).await;
    harness.sessions.set_counter("unowned", 9).await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(harness.sessions.get_counter("t1").await.unwrap(), Some(2));
    assert_eq!(harness.sessions.get_counter("unowned").await.unwrap(), None);

    handle.stop();
    handle.stopped().await;
}

#[tokio::test]
async fn test_stop_drains_stamped_messages() {
    let harness = Harness::new();
    harness.seed("t1", json!({"log": []})).await;
    let mut responses = harness.responses("t1").await;
    let handle = Coordinator::init(harness.context(), "t1").await.unwrap().run();
    let alice = SessionContext::connect("t1", "alice");

    for n in 0..5 {
        harness.send(&append(&alice, &n.to_string())).await;
    }
    let documents = &harness.documents;
    eventually(|| async move { documents.save_count("t1").await >= 1 }).await;
    handle.stop();
    handle.stopped().await;

    // Whatever was stamped before the stop was broadcast in order.
    let mut counters = Vec::new();
    while let Ok(Some(message)) =
        tokio::time::timeout(Duration::from_millis(50), responses.next_message()).await
    {
        counters.push(tripsync::shared::codec::decode(&message.payload).unwrap().counter.unwrap());
    }
    assert!(!counters.is_empty());
    assert_eq!(counters, (1..=counters.len() as u64).collect::<Vec<_>>());
    assert_eq!(harness.sessions.get_counter("t1").await.unwrap(), None);
}
