//! Fetch -> parse -> replace -> notify, one cycle at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use skycast_core::{DatabaseError, NetworkError, ParseError, Units, WeatherConfig};
use skycast_store::ForecastStore;
use skycast_weather::{
    parse_forecast, Clock, DayNormalizer, ForecastDay, ForecastLocation, WeatherProvider,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::notify::{ForecastNotification, NotificationGate, Notifier};

/// Why a sync cycle produced no new data.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetch failed: {0}")]
    Network(#[from] NetworkError),

    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Store write failed: {0}")]
    Store(#[from] DatabaseError),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::Network(e) => e.user_message(),
            SyncError::Parse(e) => e.user_message(),
            SyncError::Store(e) => e.user_message(),
            SyncError::Cancelled => "Forecast refresh was interrupted.",
        }
    }

    /// Whether running the cycle again later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(NetworkError::Timeout)
                | SyncError::Network(NetworkError::ConnectionFailed(_))
                | SyncError::Network(NetworkError::ServerError { status: 500..=599, .. })
                | SyncError::Cancelled
        )
    }
}

/// What a successful cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub rows_written: usize,
    pub notified: bool,
    pub synced_at: DateTime<Utc>,
}

pub type SyncResult = Result<SyncReport, SyncError>;

/// Orchestrates forecast syncs against a single store.
///
/// At most one cycle runs at a time; concurrent callers wait their turn.
pub struct SyncService {
    provider: WeatherProvider,
    store: Arc<ForecastStore>,
    preferences: RwLock<WeatherConfig>,
    normalizer: DayNormalizer,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    gate: NotificationGate,
    in_flight: tokio::sync::Mutex<()>,
}

impl SyncService {
    pub fn new(
        provider: WeatherProvider,
        store: Arc<ForecastStore>,
        preferences: WeatherConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let normalizer = DayNormalizer::with_offset_minutes(preferences.utc_offset_minutes);
        Self {
            provider,
            store,
            preferences: RwLock::new(preferences),
            normalizer,
            clock,
            notifier,
            gate: NotificationGate::default(),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<ForecastStore> {
        &self.store
    }

    pub fn normalizer(&self) -> DayNormalizer {
        self.normalizer
    }

    pub fn preferences(&self) -> WeatherConfig {
        self.preferences.read().clone()
    }

    /// Swap in new preferences and return the old ones. Takes effect on the next cycle.
    pub fn set_preferences(&self, preferences: WeatherConfig) -> WeatherConfig {
        std::mem::replace(&mut *self.preferences.write(), preferences)
    }

    pub fn today(&self) -> i64 {
        self.normalizer.today(self.clock.as_ref())
    }

    /// The stored forecast from today onwards.
    pub fn current_forecast(&self) -> Result<Vec<ForecastDay>, DatabaseError> {
        self.store.query_from_date(self.today())
    }

    pub fn last_notified(&self) -> Option<DateTime<Utc>> {
        self.gate.last_notified()
    }

    /// Run one sync cycle.
    pub async fn sync_weather(&self) -> SyncResult {
        self.sync_weather_with_cancel(&CancellationToken::new()).await
    }

    /// Run one sync cycle, giving up as soon as `cancel` fires.
    ///
    /// On any error the store keeps its last committed snapshot.
    pub async fn sync_weather_with_cancel(&self, cancel: &CancellationToken) -> SyncResult {
        let _flight = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.finish(Err(SyncError::Cancelled)),
            guard = self.in_flight.lock() => guard,
        };

        let result = self.run_cycle(cancel).await;
        self.finish(result)
    }

    fn finish(&self, result: SyncResult) -> SyncResult {
        match &result {
            Ok(report) => tracing::info!(
                "Forecast sync stored {} day(s){}",
                report.rows_written,
                if report.notified { ", notified" } else { "" }
            ),
            Err(SyncError::Cancelled) => tracing::info!("Forecast sync cancelled"),
            Err(SyncError::Store(e)) => {
                tracing::error!("Forecast sync failed, keeping last known forecast: {}", e)
            }
            Err(e) => tracing::warn!("Forecast sync failed, keeping last known forecast: {}", e),
        }
        result
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> SyncResult {
        let prefs = self.preferences();
        let location = ForecastLocation::from_config(&prefs);

        // Stored temperatures are always Celsius; display units are applied on read
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            fetched = self.provider.fetch(&location, Units::Metric, prefs.day_count) => fetched?,
        };

        let days = parse_forecast(&bytes, &self.normalizer)?;

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let now = self.clock.now();
        let rows_written = self.store.replace_all(&days, now)?;
        let notified = self.maybe_notify(&prefs, now);

        Ok(SyncReport {
            rows_written,
            notified,
            synced_at: now,
        })
    }

    fn maybe_notify(&self, prefs: &WeatherConfig, now: DateTime<Utc>) -> bool {
        if !prefs.notifications_enabled || !self.gate.is_due(now) {
            return false;
        }

        let today = self.normalizer.normalize_datetime(now);
        let day0 = match self.store.query_from_date(today) {
            Ok(days) => days.into_iter().next(),
            Err(e) => {
                tracing::warn!("Could not read today's forecast for notification: {}", e);
                None
            }
        };
        let Some(day0) = day0 else {
            tracing::debug!("No forecast for today, skipping notification");
            return false;
        };

        let label = match &prefs.coordinates {
            Some(c) => format!("{:.2}, {:.2}", c.latitude, c.longitude),
            None => prefs.location.clone(),
        };
        let notification = ForecastNotification::for_day(&day0, prefs.units, &label);

        match self.notifier.notify(&notification) {
            Ok(()) => {
                self.gate.record(now);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to show forecast notification: {}", e);
                false
            }
        }
    }
}
