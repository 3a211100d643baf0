use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use std::{
    collections::HashMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/3.0/onecall/timemachine";
pub const DEFAULT_UNITS: &str = "metric";
pub const DEFAULT_BACKOFF_SECS: u64 = 10;

/// Settings file looked up relative to the working directory before the
/// platform config directory.
const LOCAL_SETTINGS: &str = "data/settings.txt";

/// Run configuration, read once at startup and handed to every component.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Folder holding one cache file per (city, window).
    pub data_folder: PathBuf,
    pub api_key: String,
    /// City list CSV with `city`, `lat` and `lng` columns.
    pub cities_csv: PathBuf,
    /// Names of the cities to track.
    pub cities: Vec<String>,
    /// SQLite database file.
    pub db_name: PathBuf,
    /// Upstream unit system, e.g. "metric" or "imperial".
    pub units: String,
    pub base_url: String,
    /// Pause after every failed request.
    pub backoff: Duration,
}

impl Settings {
    /// Load settings from a flat `key=value` file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let pairs = parse_pairs(contents)?;

        let backoff_secs = match pairs.get("backoff_secs") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("Invalid backoff_secs '{raw}'"))?,
            None => DEFAULT_BACKOFF_SECS,
        };

        Ok(Self {
            data_folder: PathBuf::from(required(&pairs, "data_folder")?),
            api_key: required(&pairs, "api_key")?.to_string(),
            cities_csv: PathBuf::from(required(&pairs, "cities_csv")?),
            cities: parse_city_list(required(&pairs, "cities")?)?,
            db_name: PathBuf::from(required(&pairs, "db_name")?),
            units: pairs.get("units").cloned().unwrap_or_else(|| DEFAULT_UNITS.to_string()),
            base_url: pairs
                .get("base_url")
                .cloned()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            backoff: Duration::from_secs(backoff_secs),
        })
    }

    /// Render settings in the same `key=value` format `load` reads.
    pub fn render(&self) -> String {
        let cities = self
            .cities
            .iter()
            .map(|c| format!("'{c}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "data_folder={}", self.data_folder.display());
        let _ = writeln!(out, "api_key={}", self.api_key);
        let _ = writeln!(out, "cities_csv={}", self.cities_csv.display());
        let _ = writeln!(out, "cities=[{cities}]");
        let _ = writeln!(out, "db_name={}", self.db_name.display());
        let _ = writeln!(out, "units={}", self.units);
        if self.base_url != DEFAULT_BASE_URL {
            let _ = writeln!(out, "base_url={}", self.base_url);
        }
        let _ = writeln!(out, "backoff_secs={}", self.backoff.as_secs());
        out
    }

    /// Save settings to disk, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        fs::write(path, self.render())
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

        Ok(())
    }

    /// `data/settings.txt` when present, otherwise the platform config directory.
    pub fn default_path() -> Result<PathBuf> {
        let local = PathBuf::from(LOCAL_SETTINGS);
        if local.exists() {
            return Ok(local);
        }

        let dirs = ProjectDirs::from("dev", "weather-sync", "weather-sync")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("settings.txt"))
    }
}

fn required<'a>(pairs: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    pairs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing required setting '{key}'"))
}

fn parse_pairs(contents: &str) -> Result<HashMap<String, String>> {
    let mut pairs = HashMap::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("Line {}: expected key=value, got '{line}'", idx + 1))?;

        pairs.insert(key.trim().to_string(), value.trim().to_string());
    }

    Ok(pairs)
}

/// Parse a list literal of quoted names such as `['Berlin', "Paris"]`.
pub fn parse_city_list(raw: &str) -> Result<Vec<String>> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| anyhow!("City list must be enclosed in brackets, got '{raw}'"))?;

    let mut cities = Vec::new();
    for item in inner.split(',').map(str::trim) {
        if item.is_empty() {
            continue;
        }

        let name = ['\'', '"']
            .iter()
            .find_map(|q| item.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
            .ok_or_else(|| anyhow!("City name must be quoted, got {item}"))?;

        if name.is_empty() {
            bail!("City list contains an empty name");
        }
        cities.push(name.to_string());
    }

    Ok(cities)
}
