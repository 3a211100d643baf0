use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{FetchError, HistoryProvider};

/// OpenWeather One Call 3.0 "time machine" endpoint: one hour per request.
#[derive(Debug, Clone)]
pub struct OpenWeatherTimeMachine {
    api_key: String,
    units: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherTimeMachine {
    pub fn new(api_key: String, units: String, base_url: String) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            api_key,
            units,
            base_url,
            http,
        })
    }
}

#[async_trait]
impl HistoryProvider for OpenWeatherTimeMachine {
    async fn fetch_hour(&self, lat: f64, lon: f64, dt: i64) -> Result<serde_json::Value, FetchError> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("dt", dt.to_string()),
                ("appid", self.api_key.clone()),
                ("units", self.units.clone()),
            ])
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = res.status();
        let body = res.text().await.map_err(FetchError::from_transport)?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                body: truncate_body(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
