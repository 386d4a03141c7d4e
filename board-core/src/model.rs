use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Timezone every board is displayed in.
pub const BOARD_TIMEZONE: Tz = chrono_tz::Europe::Berlin;

/// A validated coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }
        Ok(Self { latitude, longitude })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopKind {
    Stop,
    Station,
}

impl StopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopKind::Stop => "stop",
            StopKind::Station => "station",
        }
    }
}

impl std::fmt::Display for StopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub kind: StopKind,
    pub location: Location,
    /// Distance from the query point in meters, when the API reports one.
    pub distance_m: Option<u32>,
}

/// One vehicle leaving a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    pub line: String,
    pub direction: String,
    pub planned_time: DateTime<Utc>,
    /// Realtime estimate; absent when the operator has no live data.
    pub actual_time: Option<DateTime<Utc>>,
    pub platform: Option<String>,
    pub remarks: Vec<String>,
}

impl Departure {
    /// Seconds between actual and planned time, 0 without realtime data.
    /// Negative when the vehicle runs early.
    pub fn delay_seconds(&self) -> i64 {
        self.actual_time
            .map(|actual| (actual - self.planned_time).num_seconds())
            .unwrap_or(0)
    }

    /// Actual time if known, planned time otherwise.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.actual_time.unwrap_or(self.planned_time)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature_celsius: f64,
    /// WMO weather interpretation code.
    pub condition_code: Option<u16>,
    pub description: String,
    pub observed_at: DateTime<Utc>,
    pub apparent_temperature_celsius: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub is_day: Option<bool>,
}

/// Everything needed to draw one board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub stop_name: String,
    pub local_time: DateTime<Tz>,
    departures: Vec<Departure>,
    pub weather: WeatherSnapshot,
}

impl BoardSnapshot {
    /// Departures are stored sorted by [`Departure::effective_time`].
    pub fn new(
        stop_name: String,
        local_time: DateTime<Tz>,
        mut departures: Vec<Departure>,
        weather: WeatherSnapshot,
    ) -> Self {
        sort_departures(&mut departures);
        Self { stop_name, local_time, departures, weather }
    }

    pub fn departures(&self) -> &[Departure] {
        &self.departures
    }
}

/// Stable sort, so ties keep upstream order.
pub fn sort_departures(departures: &mut [Departure]) {
    departures.sort_by_key(Departure::effective_time);
}
