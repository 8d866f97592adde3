//! Travel-time oracle backed by an OSRM HTTP service
//!
//! The engine only needs two questions answered: how long does it take to
//! reach each of these destinations (`table`), and what does the path to this
//! destination look like (`route`). [`TravelTimeOracle`] captures that contract;
//! [`OsrmClient`] answers it with the OSRM `table` and `route` services.

use std::future::Future;
use std::time::Duration;

use geo::Coord;
use log::{debug, warn};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;

use catchment_common::{Error, Result};

use super::geojson::Geometry;

/// Per-destination answer of a travel-time matrix call
#[derive(Debug, Clone, PartialEq)]
pub struct TableEntry {
    /// Seconds, `None` when the provider could not route there
    pub duration: Option<f64>,
    /// Where the provider snapped the destination to
    pub location: Coord,
}

/// One routed path with the provider's figures
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    pub coordinates: Vec<Coord>,
    /// Meters, as reported by the provider
    pub distance: f64,
    /// Seconds, as reported by the provider
    pub duration: f64,
    /// Network node ids along the path
    pub nodes: Vec<u64>,
}

/// Source of travel times and route geometries
pub trait TravelTimeOracle: Send + Sync {
    /// Durations from `origin` to every destination, in destination order
    fn table(
        &self,
        origin: Coord,
        destinations: &[Coord],
    ) -> impl Future<Output = Result<Vec<TableEntry>>> + Send;

    /// Full geometry of the path from `origin` to `destination`
    fn route(
        &self,
        origin: Coord,
        destination: Coord,
    ) -> impl Future<Output = Result<RouteGeometry>> + Send;
}

/// Connection settings for an OSRM instance
#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Retries for connection failures and timeouts
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7000".to_string(),
            profile: "walking".to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// OSRM HTTP client
pub struct OsrmClient {
    client: Client,
    config: OsrmConfig,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    durations: Vec<Vec<Option<f64>>>,
    #[serde(default)]
    destinations: Vec<Waypoint>,
}

#[derive(Debug, Deserialize)]
struct Waypoint {
    location: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: Geometry,
    distance: f64,
    duration: f64,
    #[serde(default)]
    legs: Vec<RouteLeg>,
}

#[derive(Debug, Deserialize)]
struct RouteLeg {
    #[serde(default)]
    annotation: Option<Annotation>,
}

#[derive(Debug, Deserialize)]
struct Annotation {
    #[serde(default)]
    nodes: Vec<u64>,
}

fn format_coord(c: Coord) -> String {
    format!("{:.6},{:.6}", c.x, c.y)
}

fn check_code(code: &str, message: Option<String>) -> Result<()> {
    if code == "Ok" {
        Ok(())
    } else {
        let message = message.unwrap_or_default();
        Err(Error::RoutingError(format!("{code} {message}").trim_end().to_string()))
    }
}

fn status_error(url: &str, status: StatusCode) -> Error {
    match status.as_u16() {
        400 => Error::RoutingError(format!("Provider rejected request {url} (HTTP 400)")),
        429 | 503 => Error::HttpError(format!("Provider overloaded: {status} for {url}")),
        _ => Error::HttpError(format!("{status} for {url}")),
    }
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(4)
            .user_agent(format!("catchment/{}", env!("CATCHMENT_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    fn service_url(&self, service: &str, coords: impl Iterator<Item = Coord>) -> String {
        let coords: Vec<String> = coords.map(format_coord).collect();
        format!(
            "{}/{service}/v1/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords.join(";")
        )
    }

    /// GET `url` and decode the JSON body, retrying connection failures
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.try_get_json(url).await {
                Err(Error::NetworkError(msg)) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay * (1 << (attempt - 1));
                    warn!("Network error (attempt {attempt}): {msg}, retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn try_get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET {url}");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        // OSRM reports most failures as a 400 with a JSON body carrying `code`
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            return Err(status_error(url, status));
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                Error::RoutingError(format!("Malformed response from {url}: {e}"))
            } else {
                status_error(url, status)
            }
        })
    }
}

impl TravelTimeOracle for OsrmClient {
    async fn table(&self, origin: Coord, destinations: &[Coord]) -> Result<Vec<TableEntry>> {
        let url = format!(
            "{}?sources=0",
            self.service_url("table", std::iter::once(origin).chain(destinations.iter().copied()))
        );
        let response: TableResponse = self.get_json(&url).await?;
        check_code(&response.code, response.message)?;

        let durations = response
            .durations
            .into_iter()
            .next()
            .ok_or_else(|| Error::RoutingError("Table response without durations".to_string()))?;

        let expected = destinations.len() + 1;
        if durations.len() != expected || response.destinations.len() != expected {
            return Err(Error::RoutingError(format!(
                "Table response has {} durations and {} destinations, expected {expected}",
                durations.len(),
                response.destinations.len()
            )));
        }

        // Index 0 is the origin itself
        Ok(durations
            .into_iter()
            .zip(response.destinations)
            .skip(1)
            .map(|(duration, waypoint)| TableEntry {
                duration,
                location: Coord {
                    x: waypoint.location[0],
                    y: waypoint.location[1],
                },
            })
            .collect())
    }

    async fn route(&self, origin: Coord, destination: Coord) -> Result<RouteGeometry> {
        let url = format!(
            "{}?overview=full&geometries=geojson&annotations=nodes",
            self.service_url("route", [origin, destination].into_iter())
        );
        let response: RouteResponse = self.get_json(&url).await?;
        check_code(&response.code, response.message)?;

        let route = response
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| Error::RoutingError(format!("No route in response for {url}")))?;

        let coordinates = route.geometry.as_line_string()?;
        let nodes = route
            .legs
            .into_iter()
            .flat_map(|leg| leg.annotation.map(|a| a.nodes).unwrap_or_default())
            .collect();

        Ok(RouteGeometry {
            coordinates,
            distance: route.distance,
            duration: route.duration,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OsrmClient {
        OsrmClient::new(OsrmConfig {
            base_url: server.uri(),
            max_retries: 0,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_table_skips_origin_column() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/table/v1/walking/4.900000,52.370000;4.901000,52.370000;4.902000,52.370000"))
            .and(query_param("sources", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "durations": [[0.0, 55.5, null]],
                "destinations": [
                    {"location": [4.9, 52.37]},
                    {"location": [4.901001, 52.370002]},
                    {"location": [4.902, 52.37]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let origin = Coord { x: 4.9, y: 52.37 };
        let destinations = [Coord { x: 4.901, y: 52.37 }, Coord { x: 4.902, y: 52.37 }];
        let entries = client(&server).table(origin, &destinations).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].duration, Some(55.5));
        assert_eq!(entries[0].location, Coord { x: 4.901001, y: 52.370002 });
        assert_eq!(entries[1].duration, None);
    }

    #[tokio::test]
    async fn test_table_length_mismatch_is_routing_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/table/v1/walking/.+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "durations": [[0.0]],
                "destinations": [{"location": [4.9, 52.37]}]
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .table(Coord { x: 4.9, y: 52.37 }, &[Coord { x: 4.91, y: 52.37 }])
            .await;
        assert!(matches!(result, Err(Error::RoutingError(_))));
    }

    #[tokio::test]
    async fn test_route_collects_nodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/route/v1/walking/.+$"))
            .and(query_param("annotations", "nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "Ok",
                "routes": [{
                    "geometry": {"type": "LineString", "coordinates": [[4.9, 52.37], [4.905, 52.372]]},
                    "distance": 412.3,
                    "duration": 296.9,
                    "legs": [{"annotation": {"nodes": [11, 12, 13]}}]
                }]
            })))
            .mount(&server)
            .await;

        let route = client(&server)
            .route(Coord { x: 4.9, y: 52.37 }, Coord { x: 4.905, y: 52.372 })
            .await
            .unwrap();
        assert_eq!(route.nodes, vec![11, 12, 13]);
        assert_eq!(route.coordinates.len(), 2);
        assert_eq!(route.distance, 412.3);
    }

    #[tokio::test]
    async fn test_no_route_code_is_routing_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/route/v1/walking/.+$"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": "NoRoute",
                "message": "Impossible route between points"
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .route(Coord { x: 4.9, y: 52.37 }, Coord { x: 5.9, y: 52.37 })
            .await;
        match result {
            Err(Error::RoutingError(msg)) => assert!(msg.starts_with("NoRoute")),
            other => panic!("expected RoutingError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = client(&server)
            .table(Coord { x: 4.9, y: 52.37 }, &[Coord { x: 4.91, y: 52.37 }])
            .await;
        assert!(matches!(result, Err(Error::HttpError(_))));
    }
}
