use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "SKYCAST_API_KEY";

/// Default forecast endpoint (OpenWeatherMap daily forecast).
pub const DEFAULT_API_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/forecast/daily";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory (also holds the forecast database)
    pub config_dir: PathBuf,

    /// Forecast preferences
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Sync scheduling and network policy
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Unit system requested from the forecast API and used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    /// Query parameter value understood by the forecast API.
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
        }
    }
}

/// Geographic coordinates for a forecast location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Free-form location query (city, postal code)
    pub location: String,

    /// Display unit preference; stored forecasts are always metric
    #[serde(default)]
    pub units: Units,

    /// Number of forecast days requested per sync
    #[serde(default = "default_day_count")]
    pub day_count: u32,

    /// Whether a daily forecast notification may be shown
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,

    /// Offset (minutes east of UTC) defining which calendar day a timestamp belongs to
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Forecast endpoint
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// API credential (falls back to SKYCAST_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Coordinates take precedence over the location query when set
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

fn default_day_count() -> u32 {
    14
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            location: "94043,USA".to_string(),
            units: Units::Metric,
            day_count: default_day_count(),
            notifications_enabled: default_notifications_enabled(),
            utc_offset_minutes: 0,
            api_base_url: default_api_base_url(),
            api_key: None,
            coordinates: None,
        }
    }
}

impl WeatherConfig {
    /// Configured API key, or the environment fallback.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }

    /// True when the two configurations point at a different place.
    pub fn location_differs(&self, other: &WeatherConfig) -> bool {
        self.location != other.location || self.coordinates != other.coordinates
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Earliest time after the previous run that a periodic sync may start
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Width of the execution window after `interval_secs`
    #[serde(default = "default_flex_secs")]
    pub flex_secs: u64,

    /// Only run periodic syncs while the network is reachable
    #[serde(default = "default_require_network")]
    pub require_network: bool,

    /// HTTP timeout for a single forecast request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Extra fetch attempts after a transient failure (0 = single request)
    #[serde(default)]
    pub max_retries: u32,

    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_interval_secs() -> u64 {
    3 * 60 * 60
}

fn default_flex_secs() -> u64 {
    60 * 60
}

fn default_require_network() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_retry_initial_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            flex_secs: default_flex_secs(),
            require_network: default_require_network(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: 0,
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skycast");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults if absent
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", config_path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load_validated_from(&Self::config_path()?)
    }

    /// `load_validated` for an explicit path
    pub fn load_validated_from(config_path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(config_path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(
            &self.weather.api_base_url,
            "weather.api_base_url",
            &mut result,
        );

        if self.weather.location.trim().is_empty() && self.weather.coordinates.is_none() {
            result.add_error(
                "weather.location",
                "Either a location query or coordinates must be set",
            );
        }

        if let Some(coords) = self.weather.coordinates {
            if !(-90.0..=90.0).contains(&coords.latitude) {
                result.add_error("weather.coordinates", "Latitude must be within -90..90");
            }
            if !(-180.0..=180.0).contains(&coords.longitude) {
                result.add_error("weather.coordinates", "Longitude must be within -180..180");
            }
        }

        if self.weather.day_count == 0 {
            result.add_error("weather.day_count", "Day count must be greater than 0");
        } else if self.weather.day_count > 16 {
            result.add_warning(
                "weather.day_count",
                "Forecast APIs rarely serve more than 16 days",
            );
        }

        // Offsets beyond +/-14h do not exist on Earth
        if self.weather.utc_offset_minutes.abs() > 14 * 60 {
            result.add_error(
                "weather.utc_offset_minutes",
                "UTC offset must be within +/-14 hours",
            );
        }

        if self.weather.resolved_api_key().is_none() {
            result.add_warning(
                "weather.api_key",
                format!("No API key configured and {} is not set", API_KEY_ENV),
            );
        }

        if self.sync.interval_secs == 0 {
            result.add_error("sync.interval_secs", "Sync interval must be greater than 0");
        } else if self.sync.interval_secs < 15 * 60 {
            result.add_warning(
                "sync.interval_secs",
                "Sync interval under 15 minutes may exhaust API quota",
            );
        }

        if self.sync.request_timeout_secs == 0 {
            result.add_error(
                "sync.request_timeout_secs",
                "Request timeout must be greater than 0",
            );
        }

        if self.sync.retry_initial_delay_ms > self.sync.retry_max_delay_ms {
            result.add_warning(
                "sync.retry_initial_delay_ms",
                "Initial retry delay exceeds the maximum delay",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Path of the SQLite forecast database
    pub fn database_path(&self) -> PathBuf {
        self.config_dir.join("weather.db")
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("no platform config directory".to_string()))?
            .join("skycast");

        Ok(config_dir.join("config.toml"))
    }
}
