use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, Text};
use std::{path::PathBuf, time::Duration};
use weather_sync_core::{Settings, Synchronizer, WeatherStore, config};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-sync", version, about = "Hourly weather history sync")]
pub struct Cli {
    /// Settings file; defaults to data/settings.txt or the platform config directory.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Verbose logging with source locations.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download and store every hour missing up to the end of yesterday.
    Sync {
        /// Pretend the run starts at this RFC 3339 time instead of now.
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Show the latest stored hour of each city.
    Status,

    /// Interactively write a settings file.
    Configure,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings_path = match self.settings {
            Some(path) => path,
            None => Settings::default_path()?,
        };

        match self.command {
            Command::Sync { now } => {
                let settings = Settings::load(&settings_path)?;
                let sync = Synchronizer::from_settings(settings)?;
                let report = sync.run(now.unwrap_or_else(Utc::now)).await?;

                println!(
                    "New data downloaded: {} cities synced ({} from cache, {} already current), {} hours fetched, {} rows inserted",
                    report.cities_planned,
                    report.cities_from_cache,
                    report.cities_up_to_date,
                    report.hours_fetched,
                    report.rows_inserted,
                );
            }
            Command::Status => {
                let settings = Settings::load(&settings_path)?;
                let store = WeatherStore::open(&settings.db_name)?;
                let latest = store.latest_hour_per_city()?;

                if latest.is_empty() {
                    println!("No observations stored in {}", store.path().display());
                }
                for city in latest {
                    let last = DateTime::<Utc>::from_timestamp(city.last_hour, 0)
                        .map(|dt| dt.to_rfc3339())
                        .unwrap_or_else(|| city.last_hour.to_string());
                    println!(
                        "{:<24} {:>10} {:>11}  {last}",
                        city.name,
                        fmt_coord(city.lat),
                        fmt_coord(city.lon),
                    );
                }
            }
            Command::Configure => {
                let current = Settings::load(&settings_path).ok();
                let settings = prompt_settings(current.as_ref())?;
                settings.save(&settings_path)?;
                println!("Settings written to {}", settings_path.display());
            }
        }

        Ok(())
    }
}

fn fmt_coord(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string())
}

fn prompt_settings(current: Option<&Settings>) -> Result<Settings> {
    let default_str = |f: fn(&Settings) -> String, fallback: &str| {
        current.map(f).unwrap_or_else(|| fallback.to_string())
    };

    let api_key = Password::new("OpenWeather API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let data_folder = Text::new("Cache folder:")
        .with_default(&default_str(|s| s.data_folder.display().to_string(), "data/raw"))
        .prompt()?;

    let cities_csv = Text::new("City list CSV (city,lat,lng):")
        .with_default(&default_str(|s| s.cities_csv.display().to_string(), "data/worldcities.csv"))
        .prompt()?;

    let cities = Text::new("Cities to track (comma separated):")
        .with_default(&default_str(|s| s.cities.join(", "), ""))
        .prompt()?;

    let db_name = Text::new("Database file:")
        .with_default(&default_str(|s| s.db_name.display().to_string(), "data/weather.db"))
        .prompt()?;

    let units = Text::new("Units (metric, imperial or standard):")
        .with_default(&default_str(|s| s.units.clone(), config::DEFAULT_UNITS))
        .prompt()?;

    let backoff_secs = CustomType::<u64>::new("Pause after a failed request (seconds):")
        .with_default(
            current
                .map(|s| s.backoff.as_secs())
                .unwrap_or(config::DEFAULT_BACKOFF_SECS),
        )
        .prompt()?;

    Ok(Settings {
        data_folder: PathBuf::from(data_folder),
        api_key,
        cities_csv: PathBuf::from(cities_csv),
        cities: cities
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        db_name: PathBuf::from(db_name),
        units,
        base_url: current
            .map(|s| s.base_url.clone())
            .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string()),
        backoff: Duration::from_secs(backoff_secs),
    })
}
