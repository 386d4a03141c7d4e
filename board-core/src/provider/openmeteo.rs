use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::{
    error::{ApiError, Service},
    model::{BOARD_TIMEZONE, Location, WeatherSnapshot},
};

use super::{WeatherProvider, get_json};

const CURRENT_FIELDS: &str = "temperature_2m,apparent_temperature,wind_speed_10m,weather_code,is_day";

/// Client for the Open-Meteo forecast API (no key required).
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl OpenMeteoProvider {
    pub fn new(base_url: String, http: Client) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    /// Local time in the requested timezone, e.g. `2026-02-08T20:15`.
    time: Option<String>,
    temperature_2m: f64,
    apparent_temperature: Option<f64>,
    wind_speed_10m: Option<f64>,
    weather_code: Option<u16>,
    is_day: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    current: OmCurrent,
}

/// Human-readable label for a WMO weather interpretation code.
pub fn condition_label(code: Option<u16>) -> String {
    let Some(code) = code else {
        return "Unknown".to_string();
    };
    let label = match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow",
        73 => "Moderate snow",
        75 => "Heavy snow",
        77 => "Snow grains",
        80 => "Rain showers",
        81 => "Heavy rain showers",
        82 => "Violent rain showers",
        85 => "Snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with hail",
        99 => "Thunderstorm with heavy hail",
        other => return format!("Code {other}"),
    };
    label.to_string()
}

fn parse_local_time(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    naive
        .and_local_timezone(BOARD_TIMEZONE)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

impl From<OmCurrent> for WeatherSnapshot {
    fn from(current: OmCurrent) -> Self {
        let observed_at = current
            .time
            .as_deref()
            .and_then(parse_local_time)
            .unwrap_or_else(Utc::now);

        WeatherSnapshot {
            temperature_celsius: current.temperature_2m,
            condition_code: current.weather_code,
            description: condition_label(current.weather_code),
            observed_at,
            apparent_temperature_celsius: current.apparent_temperature,
            wind_speed_kmh: current.wind_speed_10m,
            is_day: current.is_day.map(|flag| flag != 0),
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    async fn fetch_weather(&self, location: Location) -> Result<WeatherSnapshot, ApiError> {
        let url = format!("{}/v1/forecast", self.base_url);
        let params = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("current", CURRENT_FIELDS.to_string()),
            ("timezone", BOARD_TIMEZONE.name().to_string()),
        ];

        let parsed: OmResponse = get_json(&self.http, Service::OpenMeteo, &url, &params).await?;
        Ok(parsed.current.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ApiErrorKind, provider::stub};
    use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;

    fn provider(base_url: String) -> OpenMeteoProvider {
        OpenMeteoProvider::new(base_url, Client::new())
    }

    fn berlin() -> Location {
        Location::new(52.52, 13.405).unwrap()
    }

    #[test]
    fn labels_known_and_unknown_codes() {
        assert_eq!(condition_label(Some(0)), "Clear sky");
        assert_eq!(condition_label(Some(3)), "Overcast");
        assert_eq!(condition_label(Some(42)), "Code 42");
        assert_eq!(condition_label(None), "Unknown");
    }

    #[test]
    fn local_time_is_interpreted_in_berlin() {
        let parsed = parse_local_time("2026-02-08T20:15").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 8, 19, 15, 0).unwrap());
        assert_eq!(parse_local_time("yesterday"), None);
    }

    #[tokio::test]
    async fn current_weather_is_mapped() {
        let router = Router::new().route(
            "/v1/forecast",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params["timezone"], "Europe/Berlin");
                assert!(params["current"].contains("weather_code"));
                Json(json!({
                    "current": {
                        "time": "2026-02-08T20:15",
                        "temperature_2m": 3.8,
                        "apparent_temperature": 1.2,
                        "wind_speed_10m": 11.4,
                        "weather_code": 3,
                        "is_day": 0
                    }
                }))
            }),
        );
        let weather = provider(stub::serve(router).await);

        let snapshot = weather.fetch_weather(berlin()).await.unwrap();
        assert_eq!(snapshot.temperature_celsius, 3.8);
        assert_eq!(snapshot.condition_code, Some(3));
        assert_eq!(snapshot.description, "Overcast");
        assert_eq!(snapshot.apparent_temperature_celsius, Some(1.2));
        assert_eq!(snapshot.wind_speed_kmh, Some(11.4));
        assert_eq!(snapshot.is_day, Some(false));
        assert_eq!(snapshot.observed_at, Utc.with_ymd_and_hms(2026, 2, 8, 19, 15, 0).unwrap());
    }

    #[tokio::test]
    async fn optional_fields_may_be_missing() {
        let router = Router::new().route(
            "/v1/forecast",
            get(|| async { Json(json!({ "current": { "temperature_2m": -2 } })) }),
        );
        let weather = provider(stub::serve(router).await);

        let snapshot = weather.fetch_weather(berlin()).await.unwrap();
        assert_eq!(snapshot.temperature_celsius, -2.0);
        assert_eq!(snapshot.description, "Unknown");
        assert_eq!(snapshot.is_day, None);
    }

    #[tokio::test]
    async fn missing_current_block_is_a_decode_error() {
        let router =
            Router::new().route("/v1/forecast", get(|| async { Json(json!({ "hourly": {} })) }));
        let weather = provider(stub::serve(router).await);

        let err = weather.fetch_weather(berlin()).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Decode);
        assert_eq!(err.service, Service::OpenMeteo);
    }

    #[tokio::test]
    async fn service_unavailable_is_an_http_status_error() {
        let router = Router::new().route(
            "/v1/forecast",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let weather = provider(stub::serve(router).await);

        let err = weather.fetch_weather(berlin()).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::HttpStatus(503));
    }
}
