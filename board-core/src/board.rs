//! Assembling boards from the two providers.
//!
//! `show` needs every section or nothing, `watch` wants whatever is
//! available on each tick. Both go through [`fetch_board`], which returns a
//! [`PartialBoard`] carrying one `Result` per upstream section.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::{Stream, stream};
use tracing::debug;

use crate::{
    error::ApiError,
    model::{BOARD_TIMEZONE, BoardSnapshot, Departure, Location, Stop, WeatherSnapshot, sort_departures},
    provider::{DepartureQuery, TransitProvider, WeatherProvider},
};

/// What to put on the board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardParams {
    pub stop_id: String,
    /// Where to read the weather; the stop's own location when `None`.
    pub weather_location: Option<Location>,
    pub departures: DepartureQuery,
}

/// One fetch cycle, with each section possibly failed.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialBoard {
    pub stop_id: String,
    pub stop: Result<Stop, ApiError>,
    pub local_time: DateTime<Tz>,
    pub departures: Result<Vec<Departure>, ApiError>,
    pub weather: Result<WeatherSnapshot, ApiError>,
}

impl PartialBoard {
    /// Stop name if known, the raw id otherwise.
    pub fn stop_label(&self) -> &str {
        match &self.stop {
            Ok(stop) => &stop.name,
            Err(_) => &self.stop_id,
        }
    }

    /// All sections, or the first error in header, departures, weather order.
    pub fn into_snapshot(self) -> Result<BoardSnapshot, ApiError> {
        let stop = self.stop?;
        let departures = self.departures?;
        let weather = self.weather?;
        Ok(BoardSnapshot::new(stop.name, self.local_time, departures, weather))
    }
}

/// Fetch stop details, then departures and weather concurrently.
pub async fn fetch_board<T, W>(
    transit: &T,
    weather: &W,
    params: &BoardParams,
    now: DateTime<Utc>,
) -> PartialBoard
where
    T: TransitProvider + ?Sized,
    W: WeatherProvider + ?Sized,
{
    let stop = transit.fetch_stop(&params.stop_id).await;

    let weather_location = match (params.weather_location, &stop) {
        (Some(location), _) => Ok(location),
        (None, Ok(stop)) => Ok(stop.location),
        (None, Err(err)) => Err(err.clone()),
    };

    let departures_fut = transit.fetch_departures(&params.stop_id, &params.departures);
    let weather_fut = async {
        match weather_location {
            Ok(location) => weather.fetch_weather(location).await,
            Err(err) => Err(err),
        }
    };
    let (departures, weather) = tokio::join!(departures_fut, weather_fut);

    let departures = departures.map(|mut rows| {
        sort_departures(&mut rows);
        rows
    });

    for err in [stop.as_ref().err(), departures.as_ref().err(), weather.as_ref().err()]
        .into_iter()
        .flatten()
    {
        debug!(stop_id = %params.stop_id, error = %err, "board section unavailable");
    }

    PartialBoard {
        stop_id: params.stop_id.clone(),
        stop,
        local_time: now.with_timezone(&BOARD_TIMEZONE),
        departures,
        weather,
    }
}

/// Endless, lazily evaluated sequence of boards, one fetch per item.
///
/// Pacing is left to the consumer; nothing is fetched until the next item
/// is polled.
pub fn ticks<'a, T, W>(
    transit: &'a T,
    weather: &'a W,
    params: &'a BoardParams,
) -> impl Stream<Item = PartialBoard> + 'a
where
    T: TransitProvider + ?Sized,
    W: WeatherProvider + ?Sized,
{
    stream::unfold(0u64, move |tick| async move {
        debug!(tick, "fetching board");
        let board = fetch_board(transit, weather, params, Utc::now()).await;
        Some((board, tick + 1))
    })
}
