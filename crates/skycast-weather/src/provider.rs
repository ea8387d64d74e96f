//! Remote forecast fetcher.
//!
//! Builds the forecast request for a location and performs the HTTP call,
//! returning the raw response body. Parsing happens elsewhere.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Url};
use skycast_core::{NetworkError, ReqwestErrorExt, SyncConfig, Units, WeatherConfig};
use tracing::instrument;

use crate::retry::{with_retry, RetryConfig};
use crate::types::ForecastLocation;

const USER_AGENT: &str = "Skycast/0.1.0";

/// Longest error body excerpt carried into a `NetworkError`.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    base_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl WeatherProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ReqwestErrorExt::into_network_error)?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
        })
    }

    pub fn from_config(weather: &WeatherConfig, sync: &SyncConfig) -> Result<Self, NetworkError> {
        Self::new(
            &weather.api_base_url,
            weather.resolved_api_key(),
            Duration::from_secs(sync.request_timeout_secs),
            RetryConfig::from_sync_config(sync),
        )
    }

    /// Build the request URL for a location, unit system and day count.
    pub fn build_url(
        &self,
        location: &ForecastLocation,
        units: Units,
        day_count: u32,
    ) -> Result<Url, NetworkError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| NetworkError::InvalidRequest(format!("{}: {}", self.base_url, e)))?;

        {
            let mut query = url.query_pairs_mut();
            match location {
                ForecastLocation::Query(q) => {
                    query.append_pair("q", q);
                }
                ForecastLocation::Coordinates(coords) => {
                    query.append_pair("lat", &coords.latitude.to_string());
                    query.append_pair("lon", &coords.longitude.to_string());
                }
            }
            query
                .append_pair("mode", "json")
                .append_pair("units", units.as_query())
                .append_pair("cnt", &day_count.to_string());
            if let Some(key) = &self.api_key {
                query.append_pair("appid", key);
            }
        }

        Ok(url)
    }

    /// Fetch the raw forecast body.
    ///
    /// Fails with `NetworkError` on connection failure, timeout, or a
    /// non-success status.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch(
        &self,
        location: &ForecastLocation,
        units: Units,
        day_count: u32,
    ) -> Result<Vec<u8>, NetworkError> {
        let url = self.build_url(location, units, day_count)?;
        tracing::debug!("Requesting forecast from {}", self.base_url);

        let response = with_retry(&self.retry, || self.client.get(url.clone()).send())
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::warn!("Forecast request failed with status {}", status);
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;
        tracing::debug!("Received {} bytes of forecast data", bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skycast_core::Coordinates;

    fn provider(api_key: Option<&str>) -> WeatherProvider {
        WeatherProvider::new(
            "https://api.example.com/data/2.5/forecast/daily/",
            api_key.map(str::to_string),
            Duration::from_secs(5),
            RetryConfig::none(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_url_with_query() {
        let url = provider(Some("abc"))
            .build_url(&ForecastLocation::Query("94043,USA".into()), Units::Metric, 14)
            .unwrap();
        assert_eq!(url.path(), "/data/2.5/forecast/daily");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".into(), "94043,USA".into())));
        assert!(pairs.contains(&("units".into(), "metric".into())));
        assert!(pairs.contains(&("cnt".into(), "14".into())));
        assert!(pairs.contains(&("appid".into(), "abc".into())));
        assert!(pairs.contains(&("mode".into(), "json".into())));
    }

    #[test]
    fn test_build_url_with_coordinates_and_no_key() {
        let location = ForecastLocation::Coordinates(Coordinates {
            latitude: 47.5,
            longitude: -122.25,
        });
        let url = provider(None)
            .build_url(&location, Units::Imperial, 7)
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("lat".into(), "47.5".into())));
        assert!(pairs.contains(&("lon".into(), "-122.25".into())));
        assert!(pairs.contains(&("units".into(), "imperial".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "appid" || k == "q"));
    }

    #[test]
    fn test_invalid_base_url() {
        let p = WeatherProvider::new(
            "not a url",
            None,
            Duration::from_secs(1),
            RetryConfig::none(),
        )
        .unwrap();
        let err = p
            .build_url(&ForecastLocation::Query("x".into()), Units::Metric, 1)
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidRequest(_)));
    }
}
