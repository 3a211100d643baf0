//! Per-city incremental synchronization.

use anyhow::Result;
use chrono::{DateTime, Days, NaiveTime, Utc};

use crate::{
    Settings,
    cache::WindowCache,
    cities::CityCatalogue,
    fetch::fetch_window,
    model::{CityResume, CityTarget, SyncWindow, Window},
    normalize::normalize,
    provider::{HistoryProvider, provider_from_settings},
    store::WeatherStore,
};

const LOOKBACK_DAYS: u64 = 10;
const LAST_SECOND_OF_DAY: i64 = 86_399;

/// Global window of a run started at `now`: from ten days back at midnight
/// to the last second of yesterday.
pub fn default_window(now: DateTime<Utc>) -> Window {
    let midnight = |days_back: u64| {
        now.checked_sub_days(Days::new(days_back))
            .unwrap_or(now)
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp()
    };

    Window::new(midnight(LOOKBACK_DAYS), midnight(1) + LAST_SECOND_OF_DAY)
}

/// Windows to fetch this run, plus how many cities were already current.
#[derive(Debug, Default, PartialEq)]
pub struct Plan {
    pub windows: Vec<SyncWindow>,
    pub up_to_date: usize,
}

/// Derive one window per tracked city.
///
/// Cities with stored observations resume at their latest stored hour, which
/// is fetched again. Configured cities without observations start at the
/// global default start, with coordinates taken from `catalogue`. Windows
/// already reaching the last hour are dropped.
pub fn plan_windows(
    configured: &[String],
    resume: &[CityResume],
    catalogue: &CityCatalogue,
    now: DateTime<Utc>,
) -> Plan {
    let global = default_window(now);
    let mut candidates = Vec::new();

    for known in resume {
        let coords = match (known.lat, known.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => catalogue.lookup(&known.name).map(|c| (c.lat, c.lon)),
        };

        let Some((lat, lon)) = coords else {
            tracing::warn!(city = %known.name, "stored city has no coordinates, skipping");
            continue;
        };

        candidates.push(SyncWindow {
            city: CityTarget {
                name: known.name.clone(),
                lat,
                lon,
            },
            window: Window::new(known.last_hour, global.end),
        });
    }

    for name in configured {
        if resume.iter().any(|r| &r.name == name) || candidates.iter().any(|c| &c.city.name == name)
        {
            continue;
        }

        match catalogue.lookup(name) {
            Some(city) => candidates.push(SyncWindow {
                city: city.clone(),
                window: global,
            }),
            None => tracing::warn!(city = %name, "configured city not found in city list, skipping"),
        }
    }

    let (current, windows): (Vec<_>, Vec<_>) =
        candidates.into_iter().partition(|c| c.window.is_up_to_date());

    Plan {
        windows,
        up_to_date: current.len(),
    }
}

/// Summary of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub cities_planned: usize,
    pub cities_up_to_date: usize,
    pub cities_from_cache: usize,
    pub hours_fetched: usize,
    pub rows_inserted: usize,
}

#[derive(Debug)]
pub struct Synchronizer {
    settings: Settings,
    provider: Box<dyn HistoryProvider>,
    store: WeatherStore,
    cache: WindowCache,
}

impl Synchronizer {
    pub fn new(settings: Settings, provider: Box<dyn HistoryProvider>, store: WeatherStore) -> Self {
        let cache = WindowCache::new(settings.data_folder.clone());
        Self {
            settings,
            provider,
            store,
            cache,
        }
    }

    /// Wire up the upstream provider and the store described by `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider = provider_from_settings(&settings)?;
        let store = WeatherStore::open(&settings.db_name)?;
        Ok(Self::new(settings, provider, store))
    }

    pub fn store(&self) -> &WeatherStore {
        &self.store
    }

    /// Bring every tracked city up to the end of yesterday, as seen from `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        let resume = self.store.latest_hour_per_city()?;

        // The city list is only read when some city cannot be placed from the store.
        let needs_catalogue = resume.iter().any(|r| r.lat.is_none() || r.lon.is_none())
            || self
                .settings
                .cities
                .iter()
                .any(|name| !resume.iter().any(|r| &r.name == name));

        let catalogue = if needs_catalogue {
            CityCatalogue::load(&self.settings.cities_csv)?
        } else {
            CityCatalogue::default()
        };

        let plan = plan_windows(&self.settings.cities, &resume, &catalogue, now);
        let mut report = SyncReport {
            cities_planned: plan.windows.len(),
            cities_up_to_date: plan.up_to_date,
            ..SyncReport::default()
        };

        for window in &plan.windows {
            self.sync_city(window, &mut report).await?;
        }

        tracing::info!(
            planned = report.cities_planned,
            up_to_date = report.cities_up_to_date,
            from_cache = report.cities_from_cache,
            fetched = report.hours_fetched,
            inserted = report.rows_inserted,
            "new data downloaded"
        );

        Ok(report)
    }

    async fn sync_city(&self, target: &SyncWindow, report: &mut SyncReport) -> Result<()> {
        let SyncWindow { city, window } = target;

        if self.cache.contains(&city.name, *window) {
            tracing::debug!(city = %city.name, ?window, "cache hit, skipping download");
            report.cities_from_cache += 1;
        } else {
            tracing::info!(
                city = %city.name,
                hours = window.hours().count(),
                "fetching window {}..={}",
                window.start,
                window.end
            );
            let bodies =
                fetch_window(self.provider.as_ref(), city, *window, self.settings.backoff).await;
            report.hours_fetched += bodies.len();
            self.cache.store(&city.name, *window, &bodies)?;
        }

        let payloads = self.cache.load(&city.name, *window)?;
        let rows = normalize(&payloads)?;
        let inserted = self.store.save_rows(&rows)?;
        report.rows_inserted += inserted;

        tracing::info!(city = %city.name, rows = rows.len(), inserted, "weather data stored");
        Ok(())
    }
}
