//! Post-Processing Services
//!
//! Contracts for the external services the trip post-processors call while
//! applying updates: routing (route geometry and stop ordering) and media URL
//! signing. Calls are plain request/response; a slow call stalls the
//! document's apply loop until it returns or times out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// reqwest-backed clients
pub mod http;

pub use http::{HttpMediaSigner, HttpRoutingService};

/// A point on the map
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One leg between two consecutive waypoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// Route through an ordered list of waypoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polyline: Option<String>,
    #[serde(default)]
    pub legs: Vec<RouteLeg>,
}

/// Errors from external services
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{service} service is not configured")]
    Disabled { service: &'static str },
    #[error("{service} request failed: {message}")]
    Request { service: &'static str, message: String },
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: &'static str, message: String },
}

/// Maps/routing service
#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Route through `waypoints` in the given order (at least two)
    async fn route(&self, waypoints: &[Coordinates]) -> Result<Route, ServiceError>;

    /// Best visiting order of `stops`, as a permutation of their indices.
    /// `origin` is where the day starts and ends, when known.
    async fn optimize(
        &self,
        origin: Option<Coordinates>,
        stops: &[Coordinates],
    ) -> Result<Vec<usize>, ServiceError>;
}

/// Media URL signing service
#[async_trait]
pub trait MediaSigner: Send + Sync {
    /// Time-limited URL for a stored media object
    async fn sign(&self, key: &str) -> Result<String, ServiceError>;
}

/// Stand-in for a service whose URL is not configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledService;

#[async_trait]
impl RoutingService for DisabledService {
    async fn route(&self, _waypoints: &[Coordinates]) -> Result<Route, ServiceError> {
        Err(ServiceError::Disabled { service: "routing" })
    }

    async fn optimize(
        &self,
        _origin: Option<Coordinates>,
        _stops: &[Coordinates],
    ) -> Result<Vec<usize>, ServiceError> {
        Err(ServiceError::Disabled { service: "routing" })
    }
}

#[async_trait]
impl MediaSigner for DisabledService {
    async fn sign(&self, _key: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Disabled { service: "media" })
    }
}

/// Check that `order` is a permutation of `0..len`
pub fn validate_order(order: &[usize], len: usize) -> Result<(), ServiceError> {
    let mut seen = vec![false; len];
    if order.len() != len {
        return Err(ServiceError::InvalidResponse {
            service: "routing",
            message: format!("expected {} stops in order, got {}", len, order.len()),
        });
    }
    for &index in order {
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(ServiceError::InvalidResponse {
                    service: "routing",
                    message: format!("order {:?} is not a permutation", order),
                })
            }
        }
    }
    Ok(())
}
