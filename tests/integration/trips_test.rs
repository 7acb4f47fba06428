//! Trip post-processing through a running coordinator

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tripsync::backend::collab::{Coordinator, CoordinatorHandle};
use tripsync::backend::patch;
use tripsync::backend::services::Coordinates;
use tripsync::backend::trips::TripHooks;
use tripsync::shared::{OperationKind, SessionContext, SyncMessage, SyncOp, SyncPayload};

use crate::common::*;

fn place(lat: f64, lng: f64, index: &str) -> Value {
    json!({"name": format!("{},{}", lat, lng), "location": {"lat": lat, "lng": lng}, "index": index})
}

fn portugal() -> Value {
    json!({
        "id": "t1",
        "name": "Portugal",
        "owner": "alice",
        "startDate": "2026-05-01",
        "endDate": "2026-05-03",
        "itinerary": {
            "2026-05-01": {"places": {"a": place(41.14, -8.61, "V")}},
            "2026-05-02": {"places": {"b": place(41.15, -8.62, "V")}},
            "2026-05-03": {"places": {"c": place(38.72, -9.14, "V")}}
        }
    })
}

fn hotel() -> Value {
    json!({
        "name": "Hotel",
        "location": {"lat": 41.0, "lng": -8.0},
        "checkIn": "2026-05-01",
        "checkOut": "2026-05-04"
    })
}

struct TripSession {
    harness: Harness,
    routing: Arc<FakeRouting>,
    signer: Arc<FakeSigner>,
    handle: CoordinatorHandle,
    alice: SessionContext,
}

impl TripSession {
    async fn start(document: Value, routing: Arc<FakeRouting>) -> Self {
        let harness = Harness::new();
        harness.seed("t1", document).await;
        let signer = FakeSigner::new();
        let hooks = TripHooks::new(routing.clone(), signer.clone(), &harness.config);
        let context = harness.context_with_hooks(Arc::new(hooks));
        let handle = Coordinator::init(context, "t1").await.unwrap().run();
        Self {
            harness,
            routing,
            signer,
            handle,
            alice: SessionContext::connect("t1", "alice"),
        }
    }

    async fn update(&self, kind: OperationKind, ops: Vec<SyncOp>) {
        self.harness
            .send(&SyncMessage::update(&self.alice, kind, ops))
            .await;
    }

    async fn stop(self) {
        self.handle.stop();
        self.handle.stopped().await;
    }
}

fn ops_of(message: &SyncMessage) -> Vec<SyncOp> {
    match &message.payload {
        SyncPayload::Update(update) => update.ops.clone(),
        other => panic!("expected update, got {:?}", other),
    }
}

fn route_paths(ops: &[SyncOp]) -> Vec<String> {
    ops.iter()
        .filter(|op| op.path.ends_with("/route"))
        .map(|op| op.path.clone())
        .collect()
}

#[tokio::test]
async fn test_lodging_update_routes_days_concurrently() {
    let session = TripSession::start(portugal(), FakeRouting::with_delay(Duration::from_millis(50))).await;
    let mut responses = session.harness.responses("t1").await;

    session
        .update(OperationKind::UpdateLodging, vec![SyncOp::add("/lodgings/h1", hotel())])
        .await;
    let response = next_response(&mut responses).await;

    let ops = ops_of(&response);
    assert_eq!(ops[0], SyncOp::add("/lodgings/h1", hotel()));
    assert_eq!(
        route_paths(&ops),
        vec![
            "/itinerary/2026-05-01/route",
            "/itinerary/2026-05-02/route",
            "/itinerary/2026-05-03/route",
        ]
    );
    assert_eq!(session.routing.calls(), 3);
    assert!(session.routing.max_in_flight.load(Ordering::SeqCst) >= 2);

    let stored = session.harness.documents.get_json("t1").await.unwrap();
    // Hotel, place, hotel.
    assert_eq!(
        stored["itinerary"]["2026-05-02"]["route"],
        json!({"distanceMeters": 300.0, "durationSeconds": 180.0, "legs": []})
    );
    assert_eq!(stored["owner"], json!("alice"));

    session.stop().await;
}

#[tokio::test]
async fn test_failed_day_keeps_previous_route() {
    let routing = FakeRouting::new();
    routing.fail_through(Coordinates::new(41.15, -8.62));
    let session = TripSession::start(portugal(), routing).await;
    let mut responses = session.harness.responses("t1").await;

    session
        .update(OperationKind::UpdateLodging, vec![SyncOp::add("/lodgings/h1", hotel())])
        .await;
    let response = next_response(&mut responses).await;

    assert_eq!(response.error, None);
    assert_eq!(
        route_paths(&ops_of(&response)),
        vec!["/itinerary/2026-05-01/route", "/itinerary/2026-05-03/route"]
    );
    let stored = session.harness.documents.get_json("t1").await.unwrap();
    assert_eq!(stored["itinerary"]["2026-05-02"].get("route"), None);

    session.stop().await;
}

#[tokio::test]
async fn test_add_media_broadcasts_and_persists_signed_url() {
    let session = TripSession::start(portugal(), FakeRouting::new()).await;
    let mut responses = session.harness.responses("t1").await;

    session
        .update(
            OperationKind::AddMedia,
            vec![SyncOp::add("/media", json!({"m1": {"key": "beach.jpg"}}))],
        )
        .await;
    let response = next_response(&mut responses).await;

    assert_eq!(
        ops_of(&response)[1],
        SyncOp::add("/media/m1/signedUrl", json!("https://media.test/beach.jpg?v=1"))
    );
    let stored = session.harness.documents.get_json("t1").await.unwrap();
    assert_eq!(stored["media"]["m1"]["signedUrl"], json!("https://media.test/beach.jpg?v=1"));

    session.stop().await;
}

#[tokio::test]
async fn test_join_snapshot_is_signed_but_not_saved() {
    let mut document = portugal();
    document["media"] = json!({"m1": {"key": "beach.jpg", "signedUrl": "https://media.test/expired"}});
    let session = TripSession::start(document.clone(), FakeRouting::new()).await;
    let mut responses = session.harness.responses("t1").await;

    let bob = SessionContext::connect("t1", "bob");
    session.harness.send(&SyncMessage::join(&bob)).await;
    let join = next_response(&mut responses).await;

    match join.payload {
        SyncPayload::Join(join) => {
            let snapshot = join.snapshot.unwrap();
            assert_eq!(snapshot["media"]["m1"]["signedUrl"], json!("https://media.test/beach.jpg?v=1"));
        }
        other => panic!("expected join, got {:?}", other),
    }
    assert_eq!(session.signer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.harness.documents.save_count("t1").await, 0);
    assert_eq!(session.harness.documents.get_json("t1").await, Some(document));

    session.stop().await;
}

#[tokio::test]
async fn test_date_range_creates_itinerary() {
    let session = TripSession::start(json!({"id": "t1", "name": "Lisbon"}), FakeRouting::new()).await;
    let mut responses = session.harness.responses("t1").await;

    session
        .update(
            OperationKind::UpdateDateRange,
            vec![
                SyncOp::add("/startDate", json!("2026-06-10")),
                SyncOp::add("/endDate", json!("2026-06-12")),
            ],
        )
        .await;
    let response = next_response(&mut responses).await;

    assert_eq!(
        ops_of(&response)[2],
        SyncOp::add(
            "/itinerary",
            json!({
                "2026-06-10": {"places": {}},
                "2026-06-11": {"places": {}},
                "2026-06-12": {"places": {}}
            })
        )
    );
    let stored = session.harness.documents.get_json("t1").await.unwrap();
    assert_eq!(stored["itinerary"].as_object().unwrap().len(), 3);

    session.stop().await;
}

#[tokio::test]
async fn test_client_replay_matches_stored_document() {
    let session = TripSession::start(portugal(), FakeRouting::new()).await;
    let mut responses = session.harness.responses("t1").await;
    let mut client = portugal();

    session
        .update(OperationKind::UpdateLodging, vec![SyncOp::add("/lodgings/h1", hotel())])
        .await;
    session
        .update(
            OperationKind::UpdateItinerary,
            vec![SyncOp::add("/itinerary/2026-05-01/places/d", place(41.16, -8.63, "l"))],
        )
        .await;
    session
        .update(
            OperationKind::OptimizeRoute,
            vec![SyncOp::replace("/itinerary/2026-05-01/places/a/name", json!("Ribeira"))],
        )
        .await;
    session
        .update(
            OperationKind::UpdateDateRange,
            vec![SyncOp::replace("/endDate", json!("2026-05-02"))],
        )
        .await;
    session
        .update(
            OperationKind::AddMedia,
            vec![SyncOp::add("/media", json!({"m1": {"key": "tram.jpg"}}))],
        )
        .await;

    for expected in 1..=5 {
        let response = next_response(&mut responses).await;
        assert_eq!(response.counter, Some(expected));
        assert_eq!(response.error, None);
        patch::apply_to_value(&mut client, &ops_of(&response)).unwrap();
    }

    let stored = session.harness.documents.get_json("t1").await.unwrap();
    assert_eq!(client, stored);
    // Optimizing reversed day one; the route follows the new order.
    assert_eq!(stored["itinerary"]["2026-05-01"]["places"]["d"]["index"], json!("V"));
    assert_eq!(stored["itinerary"].get("2026-05-03"), None);

    session.stop().await;
}
