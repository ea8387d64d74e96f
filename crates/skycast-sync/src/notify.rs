//! Daily forecast notification and its rate limit.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use skycast_core::Units;
use skycast_weather::{format_temperature, ForecastDay};

/// A notification describing one day's forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastNotification {
    pub title: String,
    pub body: String,
    pub day: ForecastDay,
}

impl ForecastNotification {
    pub fn for_day(day: &ForecastDay, units: Units, location: &str) -> Self {
        Self {
            title: format!("Forecast for {}", location),
            body: format!(
                "{} - High: {} Low: {}",
                day.condition().description(),
                format_temperature(day.max_temp, units),
                format_temperature(day.min_temp, units),
            ),
            day: day.clone(),
        }
    }
}

/// Something that can show a notification to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &ForecastNotification) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Used when no platform notifier is wired in.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &ForecastNotification) -> anyhow::Result<()> {
        tracing::info!("{}: {}", notification.title, notification.body);
        Ok(())
    }
}

/// Allows at most one notification per rolling interval.
///
/// The mark lives for the process lifetime only.
#[derive(Debug)]
pub struct NotificationGate {
    min_interval: Duration,
    last_notified: Mutex<Option<DateTime<Utc>>>,
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new(Duration::days(1))
    }
}

impl NotificationGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_notified: Mutex::new(None),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match *self.last_notified.lock() {
            Some(last) => now - last >= self.min_interval,
            None => true,
        }
    }

    pub fn record(&self, now: DateTime<Utc>) {
        *self.last_notified.lock() = Some(now);
    }

    pub fn last_notified(&self) -> Option<DateTime<Utc>> {
        *self.last_notified.lock()
    }
}
