//! Plain-text rendering. Nothing here does I/O; callers print the lines.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{
    board::PartialBoard,
    error::ApiError,
    model::{BoardSnapshot, Departure, Stop, WeatherSnapshot},
};

const LINE_WIDTH: usize = 6;
const DIRECTION_WIDTH: usize = 28;
const NAME_WIDTH: usize = 32;

pub const NO_DEPARTURES: &str = "No upcoming departures";
pub const NO_STOPS: &str = "No stops found";

/// Render a complete board.
pub fn render(snapshot: &BoardSnapshot) -> Vec<String> {
    let mut lines = vec![header(&snapshot.stop_name, &snapshot.local_time)];
    lines.extend(departure_lines(snapshot.departures(), snapshot.local_time.with_timezone(&Utc)));
    lines.push(weather_line(&snapshot.weather));
    lines
}

/// Render a board where failed sections become warning lines.
pub fn render_partial(board: &PartialBoard) -> Vec<String> {
    let mut lines = vec![header(board.stop_label(), &board.local_time)];
    if let Err(err) = &board.stop {
        lines.push(warning("Stop details", err));
    }

    match &board.departures {
        Ok(departures) => {
            lines.extend(departure_lines(departures, board.local_time.with_timezone(&Utc)))
        }
        Err(err) => lines.push(warning("Departures", err)),
    }

    match &board.weather {
        Ok(weather) => lines.push(weather_line(weather)),
        Err(err) => lines.push(warning("Weather", err)),
    }
    lines
}

/// Footer shown under a live board.
pub fn refresh_footer(interval_seconds: u64) -> String {
    format!("Auto refresh: every {interval_seconds} seconds (Ctrl-C to stop)")
}

/// Table of nearby stops, ranked in the given order.
pub fn render_nearby(stops: &[Stop]) -> Vec<String> {
    if stops.is_empty() {
        return vec![NO_STOPS.to_string()];
    }

    let mut lines = vec![format!(
        "{:>2}  {:<NAME_WIDTH$} {:<8} {:>8}  {}",
        "#", "Name", "Type", "Distance", "ID"
    )];
    for (rank, stop) in stops.iter().enumerate() {
        let distance = stop
            .distance_m
            .map(|d| format!("{d} m"))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{:>2}  {:<NAME_WIDTH$} {:<8} {:>8}  {}",
            rank + 1,
            truncate(&stop.name, NAME_WIDTH),
            stop.kind.as_str(),
            distance,
            stop.id
        ));
    }
    lines
}

fn header(stop_label: &str, local_time: &DateTime<Tz>) -> String {
    format!("{stop_label} · Berlin time {}", local_time.format("%H:%M:%S"))
}

fn departure_lines(departures: &[Departure], now: DateTime<Utc>) -> Vec<String> {
    if departures.is_empty() {
        return vec![NO_DEPARTURES.to_string()];
    }

    let mut lines = vec![row("Line", "Direction", "In", "Platform", "Delay")];
    for departure in departures {
        lines.push(row(
            &departure.line,
            &truncate(&departure.direction, DIRECTION_WIDTH),
            &minutes_until(departure.effective_time(), now),
            departure.platform.as_deref().unwrap_or("-"),
            &delay_annotation(departure.delay_seconds()),
        ));
        for remark in &departure.remarks {
            lines.push(format!("{:LINE_WIDTH$}  ↳ {remark}", ""));
        }
    }
    lines
}

fn row(line: &str, direction: &str, eta: &str, platform: &str, delay: &str) -> String {
    format!("{line:<LINE_WIDTH$} {direction:<DIRECTION_WIDTH$} {eta:>6}  {platform:<8} {delay}")
        .trim_end()
        .to_string()
}

fn weather_line(weather: &WeatherSnapshot) -> String {
    let mut line = format!(
        "Weather: {}, {:.1}°C",
        weather.description, weather.temperature_celsius
    );
    if let Some(apparent) = weather.apparent_temperature_celsius {
        line.push_str(&format!(", feels like {apparent:.1}°C"));
    }
    if let Some(wind) = weather.wind_speed_kmh {
        line.push_str(&format!(", wind {wind:.1} km/h"));
    }
    match weather.is_day {
        Some(true) => line.push_str(", daytime"),
        Some(false) => line.push_str(", nighttime"),
        None => {}
    }
    line
}

fn warning(section: &str, err: &ApiError) -> String {
    format!("! {section} unavailable: {err}")
}

/// `now` within the next minute (or already gone), rounded minutes after.
fn minutes_until(when: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (when - now).num_seconds();
    if seconds <= 60 {
        return "now".to_string();
    }
    format!("{} min", (seconds + 30) / 60)
}

/// Only positive delays are shown, rounded up to whole minutes.
fn delay_annotation(delay_seconds: i64) -> String {
    if delay_seconds <= 0 {
        return String::new();
    }
    format!("+{} min", (delay_seconds + 59) / 60)
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
