//! Error taxonomy shared by the library and the CLI.
//!
//! Every fallible operation returns one of the specific error enums below;
//! [`Error`] wraps them so callers can match on the category (the CLI maps
//! it to an exit code).

use std::{fmt, path::PathBuf};

use thiserror::Error;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ConfigWrite(#[from] ConfigWriteError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// The shared HTTP client could not be built; nothing was sent.
    #[error("failed to set up HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Bad user input, detected before any network call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("latitude {0} is out of range (expected -90..=90)")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} is out of range (expected -180..=180)")]
    LongitudeOutOfRange(f64),

    #[error("{name} must be greater than 0")]
    NotPositive { name: &'static str },

    #[error("provide both --latitude and --longitude or neither")]
    IncompleteCoordinates,

    #[error(
        "latitude/longitude are required.\n\
         Hint: pass --latitude and --longitude, or set them under [defaults] in config.toml."
    )]
    MissingCoordinates,

    #[error(
        "a stop is required.\n\
         Hint: pass --stop-id (or coordinates), or run `bvg-board nearby --save` first."
    )]
    MissingStop,
}

/// The config file exists but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoConfigDir,

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config file {}: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Saving updated defaults failed.
#[derive(Debug, Error)]
pub enum ConfigWriteError {
    #[error("failed to create config directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read existing config file {}: {source}", .path.display())]
    ReadExisting {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("existing config file {} is not valid TOML: {source}", .path.display())]
    ParseExisting {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("`defaults` in {} is not a table", .path.display())]
    DefaultsNotATable { path: PathBuf },

    #[error("failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Upstream service an [`ApiError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Bvg,
    OpenMeteo,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Bvg => "BVG",
            Service::OpenMeteo => "Open-Meteo",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection failure or timeout.
    Network,
    /// Non-2xx response.
    HttpStatus(u16),
    /// Body could not be decoded into the expected shape.
    Decode,
    /// The request URL could not be built from the base URL.
    InvalidUrl,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Network => f.write_str("network error"),
            ApiErrorKind::HttpStatus(status) => write!(f, "HTTP status {status}"),
            ApiErrorKind::Decode => f.write_str("unexpected response"),
            ApiErrorKind::InvalidUrl => f.write_str("invalid URL"),
        }
    }
}

/// An upstream call failed. Cloneable so one failure can stand in for
/// several board sections.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{service} API error ({kind}): {message}")]
pub struct ApiError {
    pub service: Service,
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn network(service: Service, err: &reqwest::Error) -> Self {
        Self { service, kind: ApiErrorKind::Network, message: err.to_string() }
    }

    pub fn http_status(service: Service, status: u16, body: &str) -> Self {
        Self { service, kind: ApiErrorKind::HttpStatus(status), message: truncate_body(body) }
    }

    pub fn decode(service: Service, message: impl Into<String>) -> Self {
        Self { service, kind: ApiErrorKind::Decode, message: message.into() }
    }

    pub fn invalid_url(service: Service, url: &str, reason: impl fmt::Display) -> Self {
        Self { service, kind: ApiErrorKind::InvalidUrl, message: format!("{url}: {reason}") }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
