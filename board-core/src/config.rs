use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};
use toml::{Table, Value};
use tracing::debug;

use crate::{
    error::{ConfigError, ConfigWriteError, ValidationError},
    model::{Location, Stop},
};

pub const DEFAULT_BVG_BASE_URL: &str = "https://v6.bvg.transport.rest";
pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_WATCH_INTERVAL_SECONDS: u64 = 30;

/// Effective configuration for one invocation.
///
/// Example TOML:
/// ```toml
/// [defaults]
/// stop_id = "900000100001"
/// latitude = 52.52
/// longitude = 13.405
/// watch_interval_seconds = 30
///
/// [api]
/// bvg_base_url = "https://v6.bvg.transport.rest"
/// weather_base_url = "https://api.open-meteo.com"
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub stop_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub watch_interval_seconds: u64,
    pub bvg_base_url: String,
    pub weather_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stop_id: None,
            latitude: None,
            longitude: None,
            watch_interval_seconds: DEFAULT_WATCH_INTERVAL_SECONDS,
            bvg_base_url: DEFAULT_BVG_BASE_URL.to_string(),
            weather_base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
        }
    }
}

/// Values supplied on the command line; each one wins over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub stop_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub watch_interval_seconds: Option<u64>,
}

/// Fields rewritten by `nearby --save`.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultsUpdate {
    pub stop_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Stop> for DefaultsUpdate {
    fn from(stop: &Stop) -> Self {
        Self {
            stop_id: stop.id.clone(),
            latitude: stop.location.latitude,
            longitude: stop.location.longitude,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    defaults: DefaultsSection,
    api: ApiSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DefaultsSection {
    stop_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    watch_interval_seconds: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiSection {
    bvg_base_url: Option<String>,
    weather_base_url: Option<String>,
}

impl Config {
    /// Load config from the platform path, or defaults if it doesn't exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from `path`. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        Self::from_toml_str(&contents, path)
    }

    fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        let watch_interval_seconds = match file.defaults.watch_interval_seconds {
            None => DEFAULT_WATCH_INTERVAL_SECONDS,
            Some(secs) if secs > 0 => secs as u64,
            Some(_) => {
                return Err(ConfigError::Invalid {
                    path: path.to_path_buf(),
                    message: "defaults.watch_interval_seconds must be greater than 0".to_string(),
                });
            }
        };

        Ok(Self {
            stop_id: file.defaults.stop_id.filter(|id| !id.trim().is_empty()),
            latitude: file.defaults.latitude,
            longitude: file.defaults.longitude,
            watch_interval_seconds,
            bvg_base_url: base_url_or(file.api.bvg_base_url, DEFAULT_BVG_BASE_URL),
            weather_base_url: base_url_or(file.api.weather_base_url, DEFAULT_WEATHER_BASE_URL),
        })
    }

    /// Path to the config file, e.g. `~/.config/bvg-board/config.toml` on Linux.
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("", "", "bvg-board").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply command-line values on top of this config.
    pub fn merge_overrides(&self, overrides: &Overrides) -> Config {
        Config {
            stop_id: overrides.stop_id.clone().or_else(|| self.stop_id.clone()),
            latitude: overrides.latitude.or(self.latitude),
            longitude: overrides.longitude.or(self.longitude),
            watch_interval_seconds: overrides
                .watch_interval_seconds
                .unwrap_or(self.watch_interval_seconds),
            bvg_base_url: self.bvg_base_url.clone(),
            weather_base_url: self.weather_base_url.clone(),
        }
    }

    /// Both coordinates, one of them, or neither.
    pub fn location(&self) -> Result<Option<Location>, ValidationError> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Location::new(latitude, longitude).map(Some),
            (None, None) => Ok(None),
            _ => Err(ValidationError::IncompleteCoordinates),
        }
    }

    pub fn watch_interval(&self) -> Result<Duration, ValidationError> {
        if self.watch_interval_seconds == 0 {
            return Err(ValidationError::NotPositive { name: "interval" });
        }
        Ok(Duration::from_secs(self.watch_interval_seconds))
    }

    /// Merge `update` into the `[defaults]` table of the file at `path`.
    ///
    /// Every other key already in the file is kept, including ones this
    /// version doesn't know about. Parent directories are created as needed.
    pub fn save_defaults(path: &Path, update: &DefaultsUpdate) -> Result<(), ConfigWriteError> {
        let mut document = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| {
                ConfigWriteError::ReadExisting { path: path.to_path_buf(), source }
            })?;
            contents.parse::<Table>().map_err(|source| ConfigWriteError::ParseExisting {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Table::new()
        };

        let Value::Table(defaults) = document
            .entry("defaults")
            .or_insert(Value::Table(Table::new()))
        else {
            return Err(ConfigWriteError::DefaultsNotATable { path: path.to_path_buf() });
        };
        defaults.insert("stop_id".to_string(), Value::String(update.stop_id.clone()));
        defaults.insert("latitude".to_string(), Value::Float(update.latitude));
        defaults.insert("longitude".to_string(), Value::Float(update.longitude));

        let rendered = toml::to_string_pretty(&document)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigWriteError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let write_err = |source| ConfigWriteError::Write { path: path.to_path_buf(), source };
        let file = File::create(path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(rendered.as_bytes()).map_err(write_err)?;
        writer.flush().map_err(write_err)?;

        debug!(path = %path.display(), stop_id = %update.stop_id, "saved defaults");
        Ok(())
    }
}

fn base_url_or(value: Option<String>, default: &str) -> String {
    value
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("does-not-exist.toml")).unwrap();

        assert_eq!(cfg.watch_interval_seconds, 30);
        assert_eq!(cfg.bvg_base_url, DEFAULT_BVG_BASE_URL);
        assert_eq!(cfg.weather_base_url, DEFAULT_WEATHER_BASE_URL);
        assert_eq!(cfg.stop_id, None);
    }

    #[test]
    fn reads_custom_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[defaults]
stop_id = "900000100001"
latitude = 52.52
longitude = 13.40
watch_interval_seconds = 45

[api]
bvg_base_url = "https://example-bvg.test/"
weather_base_url = "https://example-weather.test"
"#,
        );

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.stop_id.as_deref(), Some("900000100001"));
        assert_eq!(cfg.latitude, Some(52.52));
        assert_eq!(cfg.longitude, Some(13.40));
        assert_eq!(cfg.watch_interval_seconds, 45);
        assert_eq!(cfg.bvg_base_url, "https://example-bvg.test");
        assert_eq!(cfg.weather_base_url, "https://example-weather.test");
    }

    #[test]
    fn missing_keys_and_empty_urls_fall_back_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[defaults]\nlatitude = 52\n\n[api]\nbvg_base_url = \"\"\n");

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.latitude, Some(52.0));
        assert_eq!(cfg.longitude, None);
        assert_eq!(cfg.watch_interval_seconds, DEFAULT_WATCH_INTERVAL_SECONDS);
        assert_eq!(cfg.bvg_base_url, DEFAULT_BVG_BASE_URL);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[defaults\nstop_id = ");

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got {err:?}");
    }

    #[test]
    fn wrongly_typed_key_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[defaults]\nlatitude = \"north\"\n");

        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn non_positive_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[defaults]\nwatch_interval_seconds = 0");

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("watch_interval_seconds must be greater than 0"));
    }

    #[test]
    fn command_line_values_take_precedence() {
        let file = Config {
            stop_id: Some("900000100001".into()),
            latitude: Some(52.52),
            longitude: Some(13.40),
            watch_interval_seconds: 45,
            ..Config::default()
        };
        let overrides = Overrides {
            stop_id: Some("900000023201".into()),
            latitude: Some(52.50),
            longitude: None,
            watch_interval_seconds: Some(5),
        };

        let merged = file.merge_overrides(&overrides);
        assert_eq!(merged.stop_id.as_deref(), Some("900000023201"));
        assert_eq!(merged.latitude, Some(52.50));
        assert_eq!(merged.longitude, Some(13.40));
        assert_eq!(merged.watch_interval_seconds, 5);
        assert_eq!(merged.bvg_base_url, file.bvg_base_url);

        assert_eq!(file.merge_overrides(&Overrides::default()), file);
    }

    #[test]
    fn location_requires_both_coordinates() {
        let cfg = Config { latitude: Some(52.5), ..Config::default() };
        assert_eq!(cfg.location(), Err(ValidationError::IncompleteCoordinates));

        let cfg = Config { latitude: Some(52.5), longitude: Some(200.0), ..Config::default() };
        assert_eq!(cfg.location(), Err(ValidationError::LongitudeOutOfRange(200.0)));

        assert_eq!(Config::default().location(), Ok(None));
    }

    #[test]
    fn zero_interval_is_a_validation_error() {
        let cfg = Config { watch_interval_seconds: 0, ..Config::default() };
        assert_eq!(
            cfg.watch_interval(),
            Err(ValidationError::NotPositive { name: "interval" })
        );
    }

    #[test]
    fn save_then_load_preserves_untouched_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
# user comment
[defaults]
stop_id = "old"
watch_interval_seconds = 12

[api]
weather_base_url = "https://example-weather.test"

[extra]
kept = true
"#,
        );
        let before = Config::load_from(&path).unwrap();

        let update = DefaultsUpdate {
            stop_id: "900000100001".into(),
            latitude: 52.5219,
            longitude: 13.4132,
        };
        Config::save_defaults(&path, &update).unwrap();

        let after = Config::load_from(&path).unwrap();
        assert_eq!(after.stop_id.as_deref(), Some("900000100001"));
        assert_eq!(after.latitude, Some(52.5219));
        assert_eq!(after.longitude, Some(13.4132));
        assert_eq!(after.watch_interval_seconds, before.watch_interval_seconds);
        assert_eq!(after.weather_base_url, before.weather_base_url);
        assert_eq!(after.bvg_base_url, before.bvg_base_url);

        let raw: Table = fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(raw["extra"]["kept"].as_bool(), Some(true));
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bvg-board").join("nested").join("config.toml");
        let update = DefaultsUpdate { stop_id: "1".into(), latitude: 1.5, longitude: -2.25 };

        Config::save_defaults(&path, &update).unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.stop_id.as_deref(), Some("1"));
        assert_eq!(cfg.longitude, Some(-2.25));
    }

    #[test]
    fn save_fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let update = DefaultsUpdate { stop_id: "1".into(), latitude: 0.0, longitude: 0.0 };

        let err = Config::save_defaults(&blocker.join("config.toml"), &update).unwrap_err();
        assert!(matches!(err, ConfigWriteError::CreateDir { .. }), "got {err:?}");
    }

    #[test]
    fn save_refuses_non_table_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "defaults = 3\n");
        let update = DefaultsUpdate { stop_id: "1".into(), latitude: 0.0, longitude: 0.0 };

        let err = Config::save_defaults(&path, &update).unwrap_err();
        assert!(matches!(err, ConfigWriteError::DefaultsNotATable { .. }));
    }
}
