//! Reshape cached responses into one flat row per hour.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{cache::CachedPayload, model::HourlyRow};

/// One entry of the upstream `data` list.
#[derive(Debug, Deserialize)]
struct HourRecord {
    dt: i64,
    temp: Option<f64>,
    wind_speed: Option<f64>,
    #[serde(default, deserialize_with = "conditions")]
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: Option<String>,
}

/// Condition lists arrive either as JSON arrays or as their textual encoding.
fn conditions<'de, D>(deserializer: D) -> Result<Vec<Condition>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => serde_json::from_str(&text).map_err(serde::de::Error::custom),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

/// Expand each payload's `data` list into rows that inherit the payload's
/// city, coordinates and timezone. Only the first weather condition of an
/// hour is kept.
pub fn normalize(payloads: &[CachedPayload]) -> Result<Vec<HourlyRow>> {
    let mut rows = Vec::with_capacity(payloads.len());

    for payload in payloads {
        let records: Vec<HourRecord> = serde_json::from_str(&payload.data).with_context(|| {
            format!("Malformed data field in cached payload for '{}'", payload.city)
        })?;

        rows.extend(records.into_iter().map(|record| HourlyRow {
            city: payload.city.clone(),
            lat: payload.lat,
            lon: payload.lon,
            timezone: payload.timezone.clone(),
            timezone_offset: payload.timezone_offset,
            dt: record.dt,
            temp: record.temp,
            description: record
                .weather
                .into_iter()
                .next()
                .and_then(|c| c.description),
            wind_speed: record.wind_speed,
        }));
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(data: Value) -> CachedPayload {
        CachedPayload {
            city: "Berlin".into(),
            lat: Some(52.52),
            lon: Some(13.4),
            timezone: Some("Europe/Berlin".into()),
            timezone_offset: Some(3600),
            data: data.to_string(),
        }
    }

    #[test]
    fn one_row_per_hour_with_broadcast_columns() {
        let payloads = vec![
            payload(json!([{"dt": 0, "temp": 1.5, "wind_speed": 2.0,
                "weather": [{"description": "light rain"}]}])),
            payload(json!([{"dt": 3600, "temp": 1.0, "wind_speed": 2.5,
                "weather": [{"description": "overcast clouds"}]}])),
        ];

        let rows = normalize(&payloads).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1],
            HourlyRow {
                city: "Berlin".into(),
                lat: Some(52.52),
                lon: Some(13.4),
                timezone: Some("Europe/Berlin".into()),
                timezone_offset: Some(3600),
                dt: 3600,
                temp: Some(1.0),
                description: Some("overcast clouds".into()),
                wind_speed: Some(2.5),
            }
        );
    }

    #[test]
    fn keeps_only_first_condition() {
        let payloads = vec![payload(json!([{"dt": 0, "temp": 3.0, "wind_speed": 1.0,
            "weather": [
                {"id": 500, "description": "light rain"},
                {"id": 701, "description": "mist"}
            ]}]))];

        let rows = normalize(&payloads).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description.as_deref(), Some("light rain"));
    }

    #[test]
    fn accepts_textual_condition_list() {
        let payloads = vec![payload(json!([{"dt": 0,
            "weather": "[{\"description\": \"snow\"}, {\"description\": \"fog\"}]"}]))];

        let rows = normalize(&payloads).unwrap();
        assert_eq!(rows[0].description.as_deref(), Some("snow"));
    }

    #[test]
    fn missing_conditions_give_no_description() {
        let payloads = vec![payload(json!([{"dt": 0, "temp": 2.0}, {"dt": 60, "weather": []}]))];

        let rows = normalize(&payloads).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.description.is_none()));
    }

    #[test]
    fn malformed_data_names_the_city() {
        let mut bad = payload(json!([]));
        bad.data = "[{'dt': 0}]".into();

        let err = normalize(&[bad]).unwrap_err();
        assert!(err.to_string().contains("Berlin"));
    }

    #[test]
    fn no_payloads_no_rows() {
        assert!(normalize(&[]).unwrap().is_empty());
    }
}
