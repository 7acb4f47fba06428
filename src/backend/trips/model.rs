use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::backend::services::{Coordinates, Route};

/// Date format of itinerary keys
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Collaboratively edited trip plan
///
/// Fields the backend does not understand are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub lodgings: BTreeMap<String, Lodging>,
    /// Days keyed by `YYYY-MM-DD`
    #[serde(default)]
    pub itinerary: BTreeMap<String, ItineraryDay>,
    #[serde(default)]
    pub media: BTreeMap<String, MediaItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lodging {
    #[serde(default)]
    pub name: String,
    pub location: Coordinates,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Lodging {
    /// Nights run from check-in up to, not including, check-out
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryDay {
    #[serde(default)]
    pub places: BTreeMap<String, Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
}

impl ItineraryDay {
    /// Place IDs in visiting order (by fractional index, then ID)
    pub fn ordered_place_ids(&self) -> Vec<String> {
        let mut places: Vec<(&String, &Place)> = self.places.iter().collect();
        places.sort_by(|(a_id, a), (b_id, b)| a.index.cmp(&b.index).then_with(|| a_id.cmp(b_id)));
        places.into_iter().map(|(id, _)| id.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    #[serde(default)]
    pub name: String,
    pub location: Coordinates,
    /// Fractional index ordering the place within its day
    #[serde(default)]
    pub index: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
}

impl Trip {
    /// Lodging whose stay covers `date`, first by ID on overlap
    pub fn lodging_on(&self, date: NaiveDate) -> Option<&Lodging> {
        self.lodgings.values().find(|lodging| lodging.covers(date))
    }

    /// Waypoints of a day's route: lodging, places in order, lodging.
    /// `None` when the day does not exist.
    pub fn day_waypoints(&self, date: &str) -> Option<Vec<Coordinates>> {
        let day = self.itinerary.get(date)?;
        let lodging = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .ok()
            .and_then(|date| self.lodging_on(date))
            .map(|lodging| lodging.location);

        let mut waypoints = Vec::with_capacity(day.places.len() + 2);
        waypoints.extend(lodging);
        for id in day.ordered_place_ids() {
            if let Some(place) = day.places.get(&id) {
                waypoints.push(place.location);
            }
        }
        waypoints.extend(lodging);
        Some(waypoints)
    }
}
