//! Core library for the `bvg-board` CLI.
//!
//! This crate defines:
//! - Configuration loading, merging and saving
//! - Clients for the BVG departures API and the Open-Meteo weather API
//! - Board assembly and plain-text rendering
//!
//! It is used by `bvg-board`, but can also be reused by other front ends.

pub mod board;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod render;

pub use board::{BoardParams, PartialBoard};
pub use config::{Config, DefaultsUpdate, Overrides};
pub use error::{ApiError, ApiErrorKind, ConfigError, ConfigWriteError, Error, ValidationError};
pub use model::{BoardSnapshot, Departure, Location, Stop, StopKind, WeatherSnapshot};
pub use provider::{DepartureQuery, NearbyQuery, TransitProvider, WeatherProvider};
