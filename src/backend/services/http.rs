/**
 * HTTP Service Clients
 *
 * JSON-over-HTTP clients for the routing and media signing services.
 *
 * # Endpoints
 *
 * - `POST {routing}/route`    `{"waypoints": [...]}`           -> `Route`
 * - `POST {routing}/optimize` `{"origin": .., "stops": [...]}` -> `{"order": [...]}`
 * - `POST {media}/sign`       `{"key": "..."}`                 -> `{"url": "..."}`
 */

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::services::{
    validate_order, Coordinates, MediaSigner, Route, RoutingService, ServiceError,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client(service: &'static str) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ServiceError::Request {
            service,
            message: e.to_string(),
        })
}

async fn post_json<B, R>(
    client: &Client,
    service: &'static str,
    url: &str,
    body: &B,
) -> Result<R, ServiceError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ServiceError::Request {
            service,
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!("[Services] {} {} returned {}", service, url, status);
        return Err(ServiceError::Status {
            service,
            status: status.as_u16(),
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| ServiceError::InvalidResponse {
            service,
            message: e.to_string(),
        })
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

#[derive(Serialize)]
struct RouteRequest<'a> {
    waypoints: &'a [Coordinates],
}

#[derive(Serialize)]
struct OptimizeRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<Coordinates>,
    stops: &'a [Coordinates],
}

#[derive(Deserialize)]
struct OptimizeResponse {
    order: Vec<usize>,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    key: &'a str,
}

#[derive(Deserialize)]
struct SignResponse {
    url: String,
}

/// Routing service over HTTP
#[derive(Debug, Clone)]
pub struct HttpRoutingService {
    client: Client,
    base_url: String,
}

impl HttpRoutingService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client("routing")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RoutingService for HttpRoutingService {
    async fn route(&self, waypoints: &[Coordinates]) -> Result<Route, ServiceError> {
        post_json(
            &self.client,
            "routing",
            &endpoint(&self.base_url, "route"),
            &RouteRequest { waypoints },
        )
        .await
    }

    async fn optimize(
        &self,
        origin: Option<Coordinates>,
        stops: &[Coordinates],
    ) -> Result<Vec<usize>, ServiceError> {
        let response: OptimizeResponse = post_json(
            &self.client,
            "routing",
            &endpoint(&self.base_url, "optimize"),
            &OptimizeRequest { origin, stops },
        )
        .await?;
        validate_order(&response.order, stops.len())?;
        Ok(response.order)
    }
}

/// Media signing service over HTTP
#[derive(Debug, Clone)]
pub struct HttpMediaSigner {
    client: Client,
    base_url: String,
}

impl HttpMediaSigner {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client("media")?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl MediaSigner for HttpMediaSigner {
    async fn sign(&self, key: &str) -> Result<String, ServiceError> {
        let response: SignResponse = post_json(
            &self.client,
            "media",
            &endpoint(&self.base_url, "sign"),
            &SignRequest { key },
        )
        .await?;
        Ok(response.url)
    }
}
