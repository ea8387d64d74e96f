//! Day normalization: the single definition of "which day is this" and "today".
//!
//! Every day key is the UTC midnight (epoch seconds) of the calendar date a
//! timestamp falls on in the configured zone. The parser, the store's range
//! predicate, and the notification path must all go through the same
//! `DayNormalizer`.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Maps timestamps to day keys for a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayNormalizer {
    offset_secs: i64,
}

impl DayNormalizer {
    /// Normalizer for UTC calendar days.
    pub fn utc() -> Self {
        Self::default()
    }

    /// Normalizer for calendar days at `offset_minutes` east of UTC.
    pub fn with_offset_minutes(offset_minutes: i32) -> Self {
        Self {
            offset_secs: i64::from(offset_minutes) * 60,
        }
    }

    /// Day key for an epoch-seconds timestamp.
    ///
    /// `None` when the timestamp is so far out that its day key is not
    /// representable.
    pub fn normalize(&self, timestamp: i64) -> Option<i64> {
        let local = timestamp.checked_add(self.offset_secs)?;
        local
            .div_euclid(SECONDS_PER_DAY)
            .checked_mul(SECONDS_PER_DAY)
    }

    pub fn normalize_datetime(&self, at: DateTime<Utc>) -> i64 {
        // chrono keeps timestamps within a few hundred thousand years of the epoch
        let local = at.timestamp() + self.offset_secs;
        local.div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY
    }

    /// Day key for the day containing `now`.
    pub fn today(&self, clock: &dyn Clock) -> i64 {
        self.normalize_datetime(clock.now())
    }

    /// Day key `days` days after `day_key`.
    ///
    /// Keys are already UTC midnights, so this never re-applies the offset.
    pub fn day_after(&self, day_key: i64, days: i64) -> i64 {
        day_key.saturating_add(days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Calendar date a day key stands for.
    pub fn calendar_date(&self, day_key: i64) -> Option<NaiveDate> {
        DateTime::from_timestamp(day_key, 0).map(|dt| dt.date_naive())
    }
}
