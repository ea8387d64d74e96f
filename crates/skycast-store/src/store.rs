//! SQLite-backed local forecast store.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use skycast_core::{DatabaseError, RusqliteErrorExt};
use skycast_weather::ForecastDay;

/// Bump when the table definition changes. A mismatch rebuilds the tables.
pub const SCHEMA_VERSION: i32 = 2;

const SELECT_COLUMNS: &str =
    "SELECT date, weather_id, min, max, humidity, pressure, wind, degrees FROM weather";

/// Local cache of the most recent forecast snapshot.
///
/// Rows are only ever written by [`ForecastStore::replace_all`]; readers get
/// owned copies.
pub struct ForecastStore {
    conn: Mutex<Connection>,
}

impl ForecastStore {
    /// Open (or create) the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let conn =
            Connection::open(path).map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Replace the whole forecast with `records` in one transaction.
    ///
    /// Either every old row is gone and every new row is present, or nothing
    /// changed. The sync time is recorded in the same transaction.
    pub fn replace_all(
        &self,
        records: &[ForecastDay],
        synced_at: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        if records.is_empty() {
            return Err(DatabaseError::WriteFailed(
                "refusing to replace the forecast with an empty set".to_string(),
            ));
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(RusqliteErrorExt::into_database_error)?;

        let deleted = tx
            .execute("DELETE FROM weather", [])
            .map_err(RusqliteErrorExt::into_database_error)?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO weather (date, weather_id, min, max, humidity, pressure, wind, degrees)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(RusqliteErrorExt::into_database_error)?;

            for day in records {
                stmt.execute(params![
                    day.date,
                    day.condition_id,
                    day.min_temp,
                    day.max_temp,
                    day.humidity,
                    day.pressure,
                    day.wind_speed,
                    day.wind_degrees,
                ])
                .map_err(RusqliteErrorExt::into_database_error)?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES ('last_sync', ?1)",
            params![synced_at.timestamp_millis()],
        )
        .map_err(RusqliteErrorExt::into_database_error)?;

        tx.commit().map_err(RusqliteErrorExt::into_database_error)?;

        tracing::debug!("Replaced {} forecast rows with {}", deleted, records.len());
        Ok(records.len())
    }

    /// Forecast days on or after `day_key`, ascending by date.
    pub fn query_from_date(&self, day_key: i64) -> Result<Vec<ForecastDay>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("{} WHERE date >= ?1 ORDER BY date ASC", SELECT_COLUMNS))
            .map_err(RusqliteErrorExt::into_database_error)?;

        let rows = stmt
            .query_map(params![day_key], row_to_day)
            .map_err(RusqliteErrorExt::into_database_error)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(RusqliteErrorExt::into_database_error)
    }

    /// The forecast for exactly one day.
    pub fn query_day(&self, day_key: i64) -> Result<Option<ForecastDay>, DatabaseError> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("{} WHERE date = ?1", SELECT_COLUMNS),
            params![day_key],
            row_to_day,
        )
        .optional()
        .map_err(RusqliteErrorExt::into_database_error)
    }

    /// Total number of stored days.
    pub fn count(&self) -> Result<usize, DatabaseError> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM weather", [], |row| row.get(0))
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(count as usize)
    }

    /// Whether any day on or after `day_key` is stored.
    pub fn has_data_from(&self, day_key: i64) -> Result<bool, DatabaseError> {
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM weather WHERE date >= ?1)",
                params![day_key],
                |row| row.get(0),
            )
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(exists)
    }

    /// Time of the last successful `replace_all`.
    pub fn last_sync(&self) -> Result<Option<DateTime<Utc>>, DatabaseError> {
        let conn = self.conn.lock();
        let millis: Option<i64> = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = 'last_sync'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(RusqliteErrorExt::into_database_error)?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }

    /// True when no sync has succeeded within `max_age` of `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> Result<bool, DatabaseError> {
        Ok(match self.last_sync()? {
            Some(at) => now - at > max_age,
            None => true,
        })
    }
}

fn row_to_day(row: &rusqlite::Row) -> rusqlite::Result<ForecastDay> {
    Ok(ForecastDay {
        date: row.get(0)?,
        condition_id: row.get(1)?,
        min_temp: row.get(2)?,
        max_temp: row.get(3)?,
        humidity: row.get(4)?,
        pressure: row.get(5)?,
        wind_speed: row.get(6)?,
        wind_degrees: row.get(7)?,
    })
}

/// Create the tables, dropping them first when the stored schema version differs.
///
/// The store only caches remote data, so a rebuild loses nothing that the
/// next sync cannot restore.
fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

    if version != SCHEMA_VERSION {
        if version != 0 {
            tracing::info!(
                "Forecast schema version {} != {}, rebuilding",
                version,
                SCHEMA_VERSION
            );
        }
        conn.execute_batch("DROP TABLE IF EXISTS weather; DROP TABLE IF EXISTS sync_meta;")
            .map_err(|e| DatabaseError::SchemaFailed(e.to_string()))?;
    }

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS weather (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date INTEGER NOT NULL,
            weather_id INTEGER NOT NULL,
            min REAL NOT NULL,
            max REAL NOT NULL,
            humidity REAL NOT NULL,
            pressure REAL NOT NULL,
            wind REAL NOT NULL,
            degrees REAL NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_weather_date ON weather(date);

        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );

        PRAGMA user_version = {};
        "#,
        SCHEMA_VERSION
    ))
    .map_err(|e| DatabaseError::SchemaFailed(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use skycast_weather::{DayNormalizer, SECONDS_PER_DAY};

    const DAY0: i64 = 1_699_920_000;

    fn day(offset: i64, min: f64, max: f64) -> ForecastDay {
        ForecastDay {
            date: DAY0 + offset * SECONDS_PER_DAY,
            condition_id: 800,
            min_temp: min,
            max_temp: max,
            humidity: 80.0,
            pressure: 1012.0,
            wind_speed: 4.0,
            wind_degrees: 270.0,
        }
    }

    fn synced_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 11, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_store_returns_no_rows() {
        let store = ForecastStore::in_memory().unwrap();
        assert!(store.query_from_date(DAY0).unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.has_data_from(DAY0).unwrap());
        assert!(store.last_sync().unwrap().is_none());
    }

    #[test]
    fn test_replace_all_and_query() {
        let store = ForecastStore::in_memory().unwrap();
        let days = vec![day(0, -5.0, 2.0), day(1, -3.0, 4.0), day(2, 0.0, 6.0)];

        assert_eq!(store.replace_all(&days, synced_at()).unwrap(), 3);

        let rows = store.query_from_date(DAY0).unwrap();
        assert_eq!(rows, days);
        assert_eq!(store.last_sync().unwrap(), Some(synced_at()));
    }

    #[test]
    fn test_replace_all_discards_previous_snapshot() {
        let store = ForecastStore::in_memory().unwrap();
        store
            .replace_all(&[day(0, 1.0, 2.0), day(1, 1.0, 2.0), day(2, 1.0, 2.0)], synced_at())
            .unwrap();
        store.replace_all(&[day(5, 7.0, 8.0)], synced_at()).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.query_from_date(0).unwrap(), vec![day(5, 7.0, 8.0)]);
    }

    #[test]
    fn test_query_from_date_filters_and_orders() {
        let store = ForecastStore::in_memory().unwrap();
        store
            .replace_all(&[day(2, 0.0, 0.0), day(0, 0.0, 0.0), day(1, 0.0, 0.0)], synced_at())
            .unwrap();

        let rows = store.query_from_date(DAY0 + SECONDS_PER_DAY).unwrap();
        let dates: Vec<i64> = rows.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![DAY0 + SECONDS_PER_DAY, DAY0 + 2 * SECONDS_PER_DAY]);
    }

    #[test]
    fn test_failed_replace_keeps_prior_rows() {
        let store = ForecastStore::in_memory().unwrap();
        let original = vec![day(0, -5.0, 2.0), day(1, -3.0, 4.0)];
        store.replace_all(&original, synced_at()).unwrap();

        // Duplicate day keys violate the unique index halfway through the insert
        let bad = vec![day(3, 0.0, 1.0), day(3, 0.0, 1.0)];
        let later = synced_at() + Duration::hours(1);
        let err = store.replace_all(&bad, later).unwrap_err();
        assert!(matches!(err, DatabaseError::WriteFailed(_)));

        assert_eq!(store.query_from_date(0).unwrap(), original);
        assert_eq!(store.last_sync().unwrap(), Some(synced_at()));
    }

    #[test]
    fn test_replace_with_empty_set_is_rejected() {
        let store = ForecastStore::in_memory().unwrap();
        store.replace_all(&[day(0, 1.0, 2.0)], synced_at()).unwrap();

        assert!(store.replace_all(&[], synced_at()).is_err());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_query_day() {
        let store = ForecastStore::in_memory().unwrap();
        store
            .replace_all(&[day(0, -5.0, 2.0), day(1, -3.0, 4.0)], synced_at())
            .unwrap();

        let found = store.query_day(DAY0 + SECONDS_PER_DAY).unwrap().unwrap();
        assert_eq!(found.min_temp, -3.0);
        assert!(store.query_day(DAY0 + 10 * SECONDS_PER_DAY).unwrap().is_none());
    }

    #[test]
    fn test_today_predicate_uses_normalized_key() {
        let n = DayNormalizer::utc();
        let store = ForecastStore::in_memory().unwrap();
        store.replace_all(&[day(0, 0.0, 1.0)], synced_at()).unwrap();

        // Any time during DAY0 normalizes to a key that still matches the row
        let afternoon = n.normalize(DAY0 + 15 * 3600).unwrap();
        assert!(store.has_data_from(afternoon).unwrap());
        assert_eq!(store.query_from_date(afternoon).unwrap().len(), 1);

        let tomorrow = n.normalize(DAY0 + SECONDS_PER_DAY + 60).unwrap();
        assert!(!store.has_data_from(tomorrow).unwrap());
    }

    #[test]
    fn test_is_stale() {
        let store = ForecastStore::in_memory().unwrap();
        assert!(store.is_stale(synced_at(), Duration::hours(6)).unwrap());

        store.replace_all(&[day(0, 0.0, 1.0)], synced_at()).unwrap();
        assert!(!store
            .is_stale(synced_at() + Duration::hours(5), Duration::hours(6))
            .unwrap());
        assert!(store
            .is_stale(synced_at() + Duration::hours(7), Duration::hours(6))
            .unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.db");

        {
            let store = ForecastStore::open(&path).unwrap();
            store.replace_all(&[day(0, -5.0, 2.0)], synced_at()).unwrap();
        }

        let store = ForecastStore::open(&path).unwrap();
        assert_eq!(store.query_from_date(DAY0).unwrap(), vec![day(0, -5.0, 2.0)]);
    }

    #[test]
    fn test_version_mismatch_rebuilds_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.db");

        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE weather (_id INTEGER PRIMARY KEY AUTOINCREMENT, date TEXT, weather_id INTEGER);
                 INSERT INTO weather (date, weather_id) VALUES ('1699920000', 800);
                 PRAGMA user_version = 1;",
            )
            .unwrap();
        }

        let store = ForecastStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        store.replace_all(&[day(0, -5.0, 2.0)], synced_at()).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let conn = Connection::open(&path).unwrap();
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
