use serde::{Deserialize, Serialize};
use skycast_core::{Coordinates, Units, WeatherConfig};

/// Weather condition categories mapped from OpenWeatherMap condition ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
    Storm,
}

impl WeatherCondition {
    /// Convert an OpenWeatherMap condition id to a WeatherCondition
    /// See: https://openweathermap.org/weather-conditions
    pub fn from_owm_id(id: i32) -> Self {
        match id {
            200..=232 => Self::Thunderstorm,
            300..=321 => Self::Drizzle,
            500 | 501 | 520 | 521 => Self::Rain,
            502..=504 | 522 | 531 => Self::HeavyRain,
            511 => Self::Sleet, // Freezing rain
            600..=602 | 620..=622 => Self::Snow,
            611..=616 => Self::Sleet,
            701..=771 => Self::Fog,
            781 | 900..=906 | 957..=962 => Self::Storm,
            800 => Self::Clear,
            801 | 802 => Self::PartlyCloudy,
            803 | 804 => Self::Cloudy,
            _ => Self::Clear, // Unknown ids default to clear
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
            Self::Storm => "Storm",
        }
    }
}

/// One calendar day of forecast data, as stored locally.
///
/// `date` is a normalized day key (UTC midnight, epoch seconds). Temperatures
/// are always Celsius; conversion happens at display time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: i64,
    pub condition_id: i32,
    pub min_temp: f64,
    pub max_temp: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub wind_degrees: f64,
}

impl ForecastDay {
    pub fn condition(&self) -> WeatherCondition {
        WeatherCondition::from_owm_id(self.condition_id)
    }

    /// One-line summary, e.g. "Clear - 2° / -5°".
    pub fn summary(&self, units: Units) -> String {
        format!(
            "{} - {} / {}",
            self.condition().description(),
            format_temperature(self.max_temp, units),
            format_temperature(self.min_temp, units),
        )
    }
}

/// Format a Celsius temperature in the requested unit system, rounded.
pub fn format_temperature(celsius: f64, units: Units) -> String {
    let value = match units {
        Units::Metric => celsius,
        Units::Imperial => celsius * 9.0 / 5.0 + 32.0,
    };
    format!("{}°", value.round() as i64)
}

/// Where to fetch a forecast for.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastLocation {
    Query(String),
    Coordinates(Coordinates),
}

impl ForecastLocation {
    /// Coordinates win over the free-form query when both are configured.
    pub fn from_config(config: &WeatherConfig) -> Self {
        match config.coordinates {
            Some(coords) => Self::Coordinates(coords),
            None => Self::Query(config.location.clone()),
        }
    }
}
