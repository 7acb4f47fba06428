//! Property-based tests for counter assignment

use proptest::prelude::*;
use serde_json::json;

use tripsync::backend::collab::Coordinator;
use tripsync::shared::{OperationKind, SessionContext, SyncMessage, SyncOp};

use crate::common::*;

/// Counters start at the recovered value and have no gaps, whatever mix of
/// updates, failing updates and leaves arrives
async fn assigned_counters(start: u64, requests: Vec<u8>) -> Vec<u64> {
    let harness = Harness::new();
    harness.seed("t1", json!({"log": []})).await;
    harness.sessions.set_counter("t1", start).await;
    let mut responses = harness.responses("t1").await;
    let handle = Coordinator::init(harness.context(), "t1").await.unwrap().run();

    let owner = SessionContext::connect("t1", "owner");
    harness.send(&SyncMessage::join(&owner)).await;
    for (n, request) in requests.iter().enumerate() {
        let guest = SessionContext::connect("t1", format!("guest-{}", n));
        let message = match request % 4 {
            0 => SyncMessage::update(&owner, OperationKind::Generic, vec![SyncOp::add("/log/-", json!(n))]),
            1 => SyncMessage::update(&owner, OperationKind::Generic, vec![SyncOp::remove("/nothing")]),
            2 => SyncMessage::join(&guest),
            _ => SyncMessage::leave(&guest),
        };
        harness.send(&message).await;
    }

    let mut counters = Vec::new();
    for _ in 0..=requests.len() {
        counters.push(next_response(&mut responses).await.counter.unwrap());
    }
    handle.stop();
    handle.stopped().await;
    counters
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_counters_are_gap_free(start in 1u64..1_000_000, requests in prop::collection::vec(any::<u8>(), 0..30)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let expected: Vec<u64> = (start..=start + requests.len() as u64).collect();

        let counters = runtime.block_on(assigned_counters(start, requests));

        prop_assert_eq!(counters, expected);
    }
}
