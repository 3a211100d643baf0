//! City list CSV used to seed cities the store has not seen yet.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{io::Read, path::Path};

use crate::model::CityTarget;

#[derive(Debug, Deserialize)]
struct CityCsvRow {
    city: String,
    lat: f64,
    lng: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CityCatalogue {
    cities: Vec<CityTarget>,
}

impl CityCatalogue {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open city list: {}", path.display()))?;

        Self::from_reader(file)
            .with_context(|| format!("Failed to parse city list: {}", path.display()))
    }

    /// Reads a CSV with at least `city`, `lat` and `lng` columns; other columns are ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);

        let cities = rdr
            .deserialize::<CityCsvRow>()
            .map(|row| {
                row.map(|r| CityTarget {
                    name: r.city,
                    lat: r.lat,
                    lon: r.lng,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { cities })
    }

    /// First row carrying this name; later duplicates are never consulted.
    pub fn lookup(&self, name: &str) -> Option<&CityTarget> {
        self.cities.iter().find(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
city,city_ascii,lat,lng,country
Berlin,Berlin,52.52,13.40,Germany
Paris,Paris,48.8567,2.3522,France
Berlin,Berlin,44.47,-71.18,United States
";

    #[test]
    fn lookup_ignores_extra_columns() {
        let catalogue = CityCatalogue::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(catalogue.len(), 3);

        let paris = catalogue.lookup("Paris").expect("Paris is listed");
        assert_eq!(paris.lat, 48.8567);
        assert_eq!(paris.lon, 2.3522);
    }

    #[test]
    fn lookup_prefers_first_duplicate() {
        let catalogue = CityCatalogue::from_reader(CSV.as_bytes()).unwrap();
        let berlin = catalogue.lookup("Berlin").unwrap();
        assert_eq!(berlin.lat, 52.52);
    }

    #[test]
    fn unknown_city_is_none() {
        let catalogue = CityCatalogue::from_reader(CSV.as_bytes()).unwrap();
        assert!(catalogue.lookup("Atlantis").is_none());
    }

    #[test]
    fn missing_column_is_an_error() {
        let res = CityCatalogue::from_reader("city,lat\nBerlin,52.5\n".as_bytes());
        assert!(res.is_err());
    }
}
