use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::{
    error::{ApiError, Service},
    model::{Departure, Location, Stop, StopKind},
};

use super::{DepartureQuery, NearbyQuery, TransitProvider, get_json};

/// Client for the BVG `transport.rest` API.
#[derive(Debug, Clone)]
pub struct BvgProvider {
    base_url: String,
    http: Client,
}

impl BvgProvider {
    pub fn new(base_url: String, http: Client) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|err| ApiError::invalid_url(Service::Bvg, &self.base_url, err))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::invalid_url(Service::Bvg, &self.base_url, "not a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct BvgLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BvgStop {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    location_type: Option<String>,
    location: BvgLocation,
    distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct BvgLine {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BvgRemark {
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BvgDeparture {
    line: Option<BvgLine>,
    direction: Option<String>,
    when: Option<DateTime<FixedOffset>>,
    planned_when: Option<DateTime<FixedOffset>>,
    platform: Option<String>,
    planned_platform: Option<String>,
    #[serde(default)]
    remarks: Vec<BvgRemark>,
}

#[derive(Debug, Deserialize)]
struct BvgDeparturesResponse {
    departures: Vec<BvgDeparture>,
}

impl From<BvgStop> for Stop {
    fn from(raw: BvgStop) -> Self {
        let kind = match raw.location_type.or(raw.kind).as_deref().map(str::to_lowercase) {
            Some(kind) if kind == "station" => StopKind::Station,
            _ => StopKind::Stop,
        };

        Stop {
            id: raw.id,
            name: raw.name,
            kind,
            location: Location { latitude: raw.location.latitude, longitude: raw.location.longitude },
            distance_m: raw.distance.filter(|d| *d >= 0.0).map(|d| d.round() as u32),
        }
    }
}

impl TryFrom<BvgDeparture> for Departure {
    type Error = ApiError;

    fn try_from(raw: BvgDeparture) -> Result<Self, Self::Error> {
        // `when` is null for cancelled trips, `plannedWhen` may be missing
        // on older feeds.
        let planned_time = raw
            .planned_when
            .or(raw.when)
            .ok_or_else(|| ApiError::decode(Service::Bvg, "departure has neither when nor plannedWhen"))?
            .with_timezone(&Utc);

        let direction = raw
            .direction
            .ok_or_else(|| ApiError::decode(Service::Bvg, "departure.direction is missing"))?;

        Ok(Departure {
            line: raw.line.and_then(|l| l.name).unwrap_or_else(|| "?".to_string()),
            direction,
            planned_time,
            actual_time: raw.when.map(|w| w.with_timezone(&Utc)),
            platform: raw.platform.or(raw.planned_platform),
            remarks: raw.remarks.into_iter().filter_map(|r| r.summary).collect(),
        })
    }
}

#[async_trait]
impl TransitProvider for BvgProvider {
    async fn find_nearby_stops(&self, query: &NearbyQuery) -> Result<Vec<Stop>, ApiError> {
        let url = self.endpoint(&["locations", "nearby"])?;

        let mut params = vec![
            ("latitude", query.location.latitude.to_string()),
            ("longitude", query.location.longitude.to_string()),
            ("results", query.limit.to_string()),
            ("stops", "true".to_string()),
            ("poi", "false".to_string()),
        ];
        if let Some(distance) = query.max_distance_m {
            params.push(("distance", distance.to_string()));
        }

        let parsed: Vec<BvgStop> =
            get_json(&self.http, Service::Bvg, url.as_str(), &params).await?;
        Ok(parsed.into_iter().map(Stop::from).collect())
    }

    async fn fetch_stop(&self, stop_id: &str) -> Result<Stop, ApiError> {
        let url = self.endpoint(&["stops", stop_id])?;
        let parsed: BvgStop = get_json(&self.http, Service::Bvg, url.as_str(), &[]).await?;
        Ok(parsed.into())
    }

    async fn fetch_departures(
        &self,
        stop_id: &str,
        query: &DepartureQuery,
    ) -> Result<Vec<Departure>, ApiError> {
        let url = self.endpoint(&["stops", stop_id, "departures"])?;

        let mut params = vec![
            ("duration", query.duration_minutes.to_string()),
            ("results", query.results.to_string()),
        ];
        if let Some(when) = query.when {
            params.push(("when", when.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let parsed: BvgDeparturesResponse =
            get_json(&self.http, Service::Bvg, url.as_str(), &params).await?;

        parsed.departures.into_iter().map(Departure::try_from).collect()
    }
}
