use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, time::Duration};
use tracing::debug;

use crate::{
    Config,
    error::{ApiError, Error, Service, ValidationError},
    model::{Departure, Location, Stop, WeatherSnapshot},
    provider::{bvg::BvgProvider, openmeteo::OpenMeteoProvider},
};

pub mod bvg;
pub mod openmeteo;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_NEARBY_LIMIT: usize = 5;

/// A validated nearby-stops query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearbyQuery {
    pub location: Location,
    pub limit: usize,
    /// Search radius in meters; the API default applies when absent.
    pub max_distance_m: Option<u32>,
}

impl NearbyQuery {
    pub fn new(
        location: Location,
        limit: usize,
        max_distance_m: Option<u32>,
    ) -> Result<Self, ValidationError> {
        if limit == 0 {
            return Err(ValidationError::NotPositive { name: "limit" });
        }
        if max_distance_m == Some(0) {
            return Err(ValidationError::NotPositive { name: "distance" });
        }
        Ok(Self { location, limit, max_distance_m })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepartureQuery {
    /// Start of the window; `None` means now.
    pub when: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub results: u32,
}

impl Default for DepartureQuery {
    fn default() -> Self {
        Self { when: None, duration_minutes: 60, results: 10 }
    }
}

#[async_trait]
pub trait TransitProvider: Send + Sync + Debug {
    /// Stops near a point, in the order the API returns them.
    async fn find_nearby_stops(&self, query: &NearbyQuery) -> Result<Vec<Stop>, ApiError>;

    async fn fetch_stop(&self, stop_id: &str) -> Result<Stop, ApiError>;

    async fn fetch_departures(
        &self,
        stop_id: &str,
        query: &DepartureQuery,
    ) -> Result<Vec<Departure>, ApiError>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch_weather(&self, location: Location) -> Result<WeatherSnapshot, ApiError>;
}

/// Validate raw coordinates and limit, then query `transit`.
///
/// Nothing is sent when validation fails. The result keeps API order and is
/// cut to `limit` rows.
pub async fn find_nearby_stops<T: TransitProvider + ?Sized>(
    transit: &T,
    latitude: f64,
    longitude: f64,
    limit: usize,
    max_distance_m: Option<u32>,
) -> Result<Vec<Stop>, Error> {
    let query = NearbyQuery::new(Location::new(latitude, longitude)?, limit, max_distance_m)?;
    let mut stops = transit.find_nearby_stops(&query).await?;
    stops.truncate(query.limit);
    Ok(stops)
}

/// Shared HTTP client: request timeout and a descriptive user agent.
pub fn http_client() -> Result<Client, Error> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("bvg-board/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::HttpClient)
}

/// Construct both HTTP providers from the configured base URLs.
pub fn providers_from_config(config: &Config) -> Result<(BvgProvider, OpenMeteoProvider), Error> {
    let http = http_client()?;
    Ok((
        BvgProvider::new(config.bvg_base_url.clone(), http.clone()),
        OpenMeteoProvider::new(config.weather_base_url.clone(), http),
    ))
}

/// GET `url` and decode a JSON body into `T`.
async fn get_json<T: DeserializeOwned>(
    http: &Client,
    service: Service,
    url: &str,
    query: &[(&str, String)],
) -> Result<T, ApiError> {
    debug!(%service, url, ?query, "GET");

    let res = http
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|err| ApiError::network(service, &err))?;

    let status = res.status();
    let body = res.text().await.map_err(|err| ApiError::network(service, &err))?;

    if !status.is_success() {
        return Err(ApiError::http_status(service, status.as_u16(), &body));
    }

    serde_json::from_str(&body)
        .map_err(|err| ApiError::decode(service, format!("failed to parse {url}: {err}")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[derive(Debug, Default)]
    struct CountingTransit {
        calls: Arc<AtomicUsize>,
    }

    fn stop(id: &str, distance_m: u32) -> Stop {
        Stop {
            id: id.to_string(),
            name: format!("Stop {id}"),
            kind: crate::model::StopKind::Stop,
            location: Location { latitude: 52.52, longitude: 13.40 },
            distance_m: Some(distance_m),
        }
    }

    #[async_trait]
    impl TransitProvider for CountingTransit {
        async fn find_nearby_stops(&self, _query: &NearbyQuery) -> Result<Vec<Stop>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                stop("c", 300),
                stop("a", 100),
                stop("b", 200),
                stop("d", 400),
                stop("e", 500),
            ])
        }

        async fn fetch_stop(&self, stop_id: &str) -> Result<Stop, ApiError> {
            Ok(stop(stop_id, 0))
        }

        async fn fetch_departures(
            &self,
            _stop_id: &str,
            _query: &DepartureQuery,
        ) -> Result<Vec<Departure>, ApiError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn nearby_keeps_api_order_and_applies_limit() {
        let transit = CountingTransit::default();

        let stops = find_nearby_stops(&transit, 52.52, 13.405, 3, None).await.unwrap();

        let ids: Vec<_> = stops.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_call() {
        let transit = CountingTransit::default();

        for (lat, lon, limit) in [(90.5, 13.4, 5), (52.5, 181.0, 5), (52.5, 13.4, 0)] {
            let err = find_nearby_stops(&transit, lat, lon, limit, None).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "got {err:?}");
        }
        let err = find_nearby_stops(&transit, 52.5, 13.4, 5, Some(0)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert_eq!(transit.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn providers_use_configured_base_urls() {
        let cfg = Config {
            bvg_base_url: "http://bvg.test".into(),
            weather_base_url: "http://weather.test".into(),
            ..Config::default()
        };
        let (bvg, weather) = providers_from_config(&cfg).unwrap();
        assert_eq!(bvg.base_url(), "http://bvg.test");
        assert_eq!(weather.base_url(), "http://weather.test");
    }
}
