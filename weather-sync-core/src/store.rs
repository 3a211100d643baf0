//! SQLite city registry and hourly observation store.
//!
//! Every operation opens its own connection; nothing is held across calls.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use crate::model::{CityResume, HourlyRow};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS Cities(
    city_id INTEGER PRIMARY KEY AUTOINCREMENT,
    city TEXT UNIQUE,
    lat DECIMAL(9,6),
    lon DECIMAL(9,6),
    timezone TEXT,
    timezone_offset INT
);

CREATE TABLE IF NOT EXISTS WeatherHourly(
    weather_id INTEGER PRIMARY KEY AUTOINCREMENT,
    city_id INT,
    dt BIGINT,
    temp DECIMAL(5,2),
    weather_description TEXT,
    wind_speed DECIMAL(5,2),
    FOREIGN KEY (city_id) REFERENCES Cities(city_id)
);
"#;

#[derive(Debug, Clone)]
pub struct WeatherStore {
    path: PathBuf,
}

impl WeatherStore {
    /// Point the store at `path` and create the tables if they are absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("Failed to open database: {}", self.path.display()))
    }

    fn init_schema(&self) -> Result<()> {
        self.connect()?
            .execute_batch(SCHEMA)
            .context("Failed to create database schema")?;
        Ok(())
    }

    /// Id of the city named `name`, inserting it on first sight.
    ///
    /// An existing row is returned as is; coordinates and timezone passed here
    /// never overwrite what was stored first.
    pub fn resolve_city(
        &self,
        name: &str,
        lat: Option<f64>,
        lon: Option<f64>,
        timezone: Option<&str>,
        timezone_offset: Option<i64>,
    ) -> Result<i64> {
        let conn = self.connect()?;

        let existing = conn
            .query_row(
                "SELECT city_id FROM Cities WHERE city = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .with_context(|| format!("Failed to look up city '{name}'"))?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO Cities(city, lat, lon, timezone, timezone_offset) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, lat, lon, timezone, timezone_offset],
        )
        .with_context(|| format!("Failed to insert city '{name}'"))?;

        let id = conn.last_insert_rowid();
        tracing::debug!(city = name, city_id = id, "registered new city");
        Ok(id)
    }

    /// Insert one observation unless `(city_id, dt)` is already stored.
    ///
    /// Returns whether a row was written. Existing rows are never updated.
    pub fn insert_hour(
        &self,
        city_id: i64,
        dt: i64,
        temp: Option<f64>,
        description: Option<&str>,
        wind_speed: Option<f64>,
    ) -> Result<bool> {
        let conn = self.connect()?;

        let exists = conn
            .query_row(
                "SELECT weather_id FROM WeatherHourly WHERE city_id = ?1 AND dt = ?2",
                params![city_id, dt],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .context("Failed to check for an existing observation")?
            .is_some();

        if exists {
            return Ok(false);
        }

        conn.execute(
            r#"
            INSERT INTO WeatherHourly(city_id, dt, temp, weather_description, wind_speed)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![city_id, dt, temp, description, wind_speed],
        )
        .with_context(|| format!("Failed to insert observation for city {city_id} at {dt}"))?;

        Ok(true)
    }

    /// Latest stored hour of every city that has at least one observation,
    /// ordered by city name.
    pub fn latest_hour_per_city(&self) -> Result<Vec<CityResume>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT Cities.city, Cities.lat, Cities.lon, MAX(WeatherHourly.dt) AS last_date
            FROM Cities
            JOIN WeatherHourly ON Cities.city_id = WeatherHourly.city_id
            GROUP BY Cities.city, Cities.lat, Cities.lon
            ORDER BY Cities.city
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(CityResume {
                name: row.get(0)?,
                lat: row.get(1)?,
                lon: row.get(2)?,
                last_hour: row.get(3)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to read latest hour per city")
    }

    /// Store normalized rows, registering their cities as needed.
    ///
    /// Returns how many observations were new.
    pub fn save_rows(&self, rows: &[HourlyRow]) -> Result<usize> {
        let mut inserted = 0;

        for row in rows {
            let city_id = self.resolve_city(
                &row.city,
                row.lat,
                row.lon,
                row.timezone.as_deref(),
                row.timezone_offset,
            )?;

            if self.insert_hour(
                city_id,
                row.dt,
                row.temp,
                row.description.as_deref(),
                row.wind_speed,
            )? {
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, WeatherStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = WeatherStore::open(dir.path().join("weather.db")).unwrap();
        (dir, store)
    }

    fn count_hours(store: &WeatherStore, city_id: i64, dt: i64) -> i64 {
        store
            .connect()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM WeatherHourly WHERE city_id = ?1 AND dt = ?2",
                params![city_id, dt],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn open_is_idempotent() {
        let (dir, _store) = temp_store();
        assert!(WeatherStore::open(dir.path().join("weather.db")).is_ok());
    }

    #[test]
    fn resolve_city_returns_same_id_and_keeps_first_coordinates() {
        let (_dir, store) = temp_store();

        let first = store
            .resolve_city("Berlin", Some(52.52), Some(13.40), Some("Europe/Berlin"), Some(3600))
            .unwrap();
        let second = store
            .resolve_city("Berlin", Some(1.0), Some(2.0), None, None)
            .unwrap();
        assert_eq!(first, second);

        let (lat, lon, tz): (f64, f64, String) = store
            .connect()
            .unwrap()
            .query_row(
                "SELECT lat, lon, timezone FROM Cities WHERE city_id = ?1",
                params![first],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!((lat, lon), (52.52, 13.40));
        assert_eq!(tz, "Europe/Berlin");
    }

    #[test]
    fn distinct_cities_get_distinct_ids() {
        let (_dir, store) = temp_store();
        let a = store.resolve_city("Berlin", None, None, None, None).unwrap();
        let b = store.resolve_city("Paris", None, None, None, None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn insert_hour_drops_duplicates_without_updating() {
        let (_dir, store) = temp_store();
        let id = store.resolve_city("Berlin", None, None, None, None).unwrap();

        assert!(store.insert_hour(id, 1_710_028_800, Some(5.0), Some("clear sky"), Some(3.1)).unwrap());
        assert!(!store.insert_hour(id, 1_710_028_800, Some(9.9), Some("rain"), Some(0.0)).unwrap());
        assert_eq!(count_hours(&store, id, 1_710_028_800), 1);

        let temp: f64 = store
            .connect()
            .unwrap()
            .query_row("SELECT temp FROM WeatherHourly WHERE city_id = ?1", params![id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(temp, 5.0);
    }

    #[test]
    fn latest_hour_per_city_is_sorted_and_skips_empty_cities() {
        let (_dir, store) = temp_store();
        let paris = store.resolve_city("Paris", Some(48.85), Some(2.35), None, None).unwrap();
        let berlin = store.resolve_city("Berlin", Some(52.52), Some(13.40), None, None).unwrap();
        store.resolve_city("Oslo", Some(59.91), Some(10.75), None, None).unwrap();

        store.insert_hour(paris, 100, None, None, None).unwrap();
        store.insert_hour(paris, 7300, None, None, None).unwrap();
        store.insert_hour(berlin, 3700, None, None, None).unwrap();

        let latest = store.latest_hour_per_city().unwrap();
        assert_eq!(
            latest,
            vec![
                CityResume {
                    name: "Berlin".into(),
                    lat: Some(52.52),
                    lon: Some(13.40),
                    last_hour: 3700,
                },
                CityResume {
                    name: "Paris".into(),
                    lat: Some(48.85),
                    lon: Some(2.35),
                    last_hour: 7300,
                },
            ]
        );
    }

    #[test]
    fn save_rows_counts_only_new_observations() {
        let (_dir, store) = temp_store();
        let row = HourlyRow {
            city: "Berlin".into(),
            lat: Some(52.52),
            lon: Some(13.40),
            timezone: Some("Europe/Berlin".into()),
            timezone_offset: Some(3600),
            dt: 1_710_028_800,
            temp: Some(4.2),
            description: Some("overcast clouds".into()),
            wind_speed: Some(2.5),
        };

        assert_eq!(store.save_rows(std::slice::from_ref(&row)).unwrap(), 1);
        assert_eq!(store.save_rows(&[row]).unwrap(), 0);
    }
}
