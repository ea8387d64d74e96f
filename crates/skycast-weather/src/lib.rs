//! Forecast retrieval for Skycast
//!
//! Fetches the daily forecast from an OpenWeatherMap-style endpoint and turns
//! the response into normalized per-day records.

pub mod date;
pub mod parser;
pub mod provider;
pub mod retry;
pub mod types;

pub use date::{Clock, DayNormalizer, ManualClock, SystemClock, SECONDS_PER_DAY};
pub use parser::parse_forecast;
pub use provider::WeatherProvider;
pub use retry::RetryConfig;
pub use types::*;
