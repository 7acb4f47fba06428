/**
 * Trip Post-Processors
 *
 * One processor per `OperationKind`. A processor runs after an update's ops
 * were applied, mutates the decoded trip and returns the derived ops it
 * performed, so clients replaying the broadcast reach the same document as
 * the coordinator.
 *
 * # Derived Ops
 *
 * | Kind              | Ops                                          |
 * |-------------------|----------------------------------------------|
 * | `addMedia`        | `add /media/{id}/signedUrl`                  |
 * | `updateLodging`   | `add`/`remove /itinerary/{date}/route`       |
 * | `updateItinerary` | `add`/`remove /itinerary/{date}/route`       |
 * | `optimizeRoute`   | `replace .../places/{id}/index` then routes  |
 * | `updateDateRange` | `add`/`remove /itinerary/{date}`             |
 * | `generic`         | none                                         |
 */

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::backend::error::SyncError;
use crate::backend::patch::{parse_pointer, pointer};
use crate::backend::services::{MediaSigner, Route, RoutingService};
use crate::backend::trips::fractional::keys_after;
use crate::backend::trips::model::{ItineraryDay, Trip, DATE_FORMAT};
use crate::shared::{OperationKind, SyncOp};

#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Mutate `trip` after `ops` were applied; return the derived ops
    async fn process(&self, trip: &mut Trip, ops: &[SyncOp]) -> Result<Vec<SyncOp>, SyncError>;
}

/// Build the processor for `kind`
pub fn processor_for(
    kind: OperationKind,
    routing: Arc<dyn RoutingService>,
    signer: Arc<dyn MediaSigner>,
    max_trip_days: usize,
) -> Arc<dyn PostProcessor> {
    match kind {
        OperationKind::AddMedia => Arc::new(MediaSigning { signer }),
        OperationKind::UpdateLodging => Arc::new(LodgingRoutes { routing }),
        OperationKind::UpdateItinerary => Arc::new(ItineraryRoutes { routing }),
        OperationKind::OptimizeRoute => Arc::new(RouteOptimizer { routing }),
        OperationKind::UpdateDateRange => Arc::new(DateRange { max_trip_days }),
        OperationKind::Generic => Arc::new(NoPostProcessing),
    }
}

/// Signs media items that have no URL yet
pub struct MediaSigning {
    signer: Arc<dyn MediaSigner>,
}

#[async_trait]
impl PostProcessor for MediaSigning {
    async fn process(&self, trip: &mut Trip, _ops: &[SyncOp]) -> Result<Vec<SyncOp>, SyncError> {
        let mut derived = Vec::new();
        for (id, item) in trip.media.iter_mut().filter(|(_, item)| item.signed_url.is_none()) {
            match self.signer.sign(&item.key).await {
                Ok(url) => {
                    derived.push(SyncOp::add(pointer(&["media", id.as_str(), "signedUrl"]), json!(url)));
                    item.signed_url = Some(url);
                }
                Err(e) => tracing::warn!("[Trips] Failed to sign media {}: {}", id, e),
            }
        }
        Ok(derived)
    }
}

/// Lodging changes can move the start/end of every day
pub struct LodgingRoutes {
    routing: Arc<dyn RoutingService>,
}

#[async_trait]
impl PostProcessor for LodgingRoutes {
    async fn process(&self, trip: &mut Trip, _ops: &[SyncOp]) -> Result<Vec<SyncOp>, SyncError> {
        let days: BTreeSet<String> = trip.itinerary.keys().cloned().collect();
        Ok(recompute_routes(&self.routing, trip, days).await)
    }
}

/// Recomputes routes of the days an itinerary update touched
pub struct ItineraryRoutes {
    routing: Arc<dyn RoutingService>,
}

#[async_trait]
impl PostProcessor for ItineraryRoutes {
    async fn process(&self, trip: &mut Trip, ops: &[SyncOp]) -> Result<Vec<SyncOp>, SyncError> {
        let days = touched_days(trip, ops);
        Ok(recompute_routes(&self.routing, trip, days).await)
    }
}

/// Reorders each touched day's places by the routing service's best order
pub struct RouteOptimizer {
    routing: Arc<dyn RoutingService>,
}

#[async_trait]
impl PostProcessor for RouteOptimizer {
    async fn process(&self, trip: &mut Trip, ops: &[SyncOp]) -> Result<Vec<SyncOp>, SyncError> {
        let days = touched_days(trip, ops);
        let mut derived = Vec::new();

        for date in &days {
            let origin = NaiveDate::parse_from_str(date, DATE_FORMAT)
                .ok()
                .and_then(|d| trip.lodging_on(d))
                .map(|lodging| lodging.location);
            let Some(day) = trip.itinerary.get_mut(date) else {
                continue;
            };
            let ids = day.ordered_place_ids();
            if ids.len() < 2 {
                continue;
            }
            let stops: Vec<_> = ids
                .iter()
                .filter_map(|id| day.places.get(id).map(|place| place.location))
                .collect();

            let order = match self.routing.optimize(origin, &stops).await {
                Ok(order) => order,
                Err(e) => {
                    tracing::warn!("[Trips] Failed to optimize {}: {}", date, e);
                    continue;
                }
            };

            let keys = keys_after(None, order.len())?;
            for (position, key) in order.iter().zip(keys) {
                let Some(id) = ids.get(*position) else { continue };
                let Some(place) = day.places.get_mut(id) else { continue };
                if place.index != key {
                    derived.push(SyncOp::replace(
                        pointer(&["itinerary", date.as_str(), "places", id.as_str(), "index"]),
                        json!(key),
                    ));
                    place.index = key;
                }
            }
        }

        derived.extend(recompute_routes(&self.routing, trip, days).await);
        Ok(derived)
    }
}

/// Keeps exactly the days of `[startDate, endDate]` in the itinerary
pub struct DateRange {
    max_trip_days: usize,
}

#[async_trait]
impl PostProcessor for DateRange {
    async fn process(&self, trip: &mut Trip, _ops: &[SyncOp]) -> Result<Vec<SyncOp>, SyncError> {
        let (Some(start), Some(end)) = (trip.start_date, trip.end_date) else {
            return Ok(Vec::new());
        };
        if end < start {
            tracing::warn!("[Trips] Ignoring date range {} > {}", start, end);
            return Ok(Vec::new());
        }

        let wanted: BTreeSet<String> = date_range(start, end, self.max_trip_days)
            .map(|date| date.format(DATE_FORMAT).to_string())
            .collect();
        let mut derived = Vec::new();

        let stale: Vec<String> = trip
            .itinerary
            .keys()
            .filter(|date| !wanted.contains(*date))
            .cloned()
            .collect();
        for date in stale {
            trip.itinerary.remove(&date);
            derived.push(SyncOp::remove(pointer(&["itinerary", date.as_str()])));
        }

        if trip.itinerary.is_empty() {
            // The itinerary object may be missing entirely; write it whole.
            trip.itinerary = wanted
                .into_iter()
                .map(|date| (date, ItineraryDay::default()))
                .collect();
            derived.push(SyncOp::add("/itinerary", serde_json::to_value(&trip.itinerary)?));
            return Ok(derived);
        }

        for date in wanted {
            if !trip.itinerary.contains_key(&date) {
                let day = ItineraryDay::default();
                derived.push(SyncOp::add(pointer(&["itinerary", date.as_str()]), serde_json::to_value(&day)?));
                trip.itinerary.insert(date, day);
            }
        }
        Ok(derived)
    }
}

pub struct NoPostProcessing;

#[async_trait]
impl PostProcessor for NoPostProcessing {
    async fn process(&self, _trip: &mut Trip, _ops: &[SyncOp]) -> Result<Vec<SyncOp>, SyncError> {
        Ok(Vec::new())
    }
}

fn date_range(start: NaiveDate, end: NaiveDate, limit: usize) -> impl Iterator<Item = NaiveDate> {
    (0u64..)
        .map_while(move |offset| start.checked_add_days(Days::new(offset)))
        .take_while(move |date| *date <= end)
        .take(limit)
}

/// Itinerary days referenced by the ops' paths; every day when the
/// itinerary (or the whole document) was replaced
pub fn touched_days(trip: &Trip, ops: &[SyncOp]) -> BTreeSet<String> {
    let mut days = BTreeSet::new();
    let paths = ops
        .iter()
        .flat_map(|op| std::iter::once(op.path.as_str()).chain(op.from.as_deref()));

    for path in paths {
        let Ok(segments) = parse_pointer(path) else { continue };
        match segments.as_slice() {
            [] => return trip.itinerary.keys().cloned().collect(),
            [root] if root == "itinerary" => return trip.itinerary.keys().cloned().collect(),
            [root, date, ..] if root == "itinerary" => {
                days.insert(date.clone());
            }
            _ => {}
        }
    }
    days
}

/// Recompute routes of `days` concurrently, one task per day, then write the
/// merged results into `trip`. Days that no longer exist are skipped; a
/// failed day keeps its previous route.
pub async fn recompute_routes(
    routing: &Arc<dyn RoutingService>,
    trip: &mut Trip,
    days: BTreeSet<String>,
) -> Vec<SyncOp> {
    let merged: Arc<Mutex<BTreeMap<String, Option<Route>>>> = Arc::new(Mutex::new(BTreeMap::new()));
    let mut tasks = JoinSet::new();

    for date in days {
        let Some(waypoints) = trip.day_waypoints(&date) else {
            continue;
        };
        let routing = Arc::clone(routing);
        let merged = Arc::clone(&merged);
        tasks.spawn(async move {
            let route = if waypoints.len() < 2 {
                Ok(None)
            } else {
                routing.route(&waypoints).await.map(Some)
            };
            match route {
                Ok(route) => {
                    merged.lock().await.insert(date, route);
                }
                Err(e) => tracing::warn!("[Trips] Failed to route {}: {}", date, e),
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("[Trips] Route task failed: {}", e);
        }
    }

    let merged = std::mem::take(&mut *merged.lock().await);
    let mut derived = Vec::new();
    for (date, route) in merged {
        let Some(day) = trip.itinerary.get_mut(&date) else {
            continue;
        };
        if day.route == route {
            continue;
        }
        let path = pointer(&["itinerary", date.as_str(), "route"]);
        match &route {
            Some(route) => derived.push(SyncOp::add(path, serde_json::to_value(route).unwrap_or_default())),
            None => derived.push(SyncOp::remove(path)),
        }
        day.route = route;
    }
    derived
}
