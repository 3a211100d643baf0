use async_trait::async_trait;
use reqwest::StatusCode;
use std::{error::Error as _, fmt::Debug};
use thiserror::Error;

use crate::{Settings, provider::openweather::OpenWeatherTimeMachine};

pub mod openweather;

/// Failure of a single hourly request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("secure transport failure: {0}")]
    SecureTransport(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Coarse classes of [`FetchError`] the fetch loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    HttpStatus,
    SecureTransport,
    Other,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Status { .. } => ErrorKind::HttpStatus,
            FetchError::SecureTransport(_) => ErrorKind::SecureTransport,
            FetchError::Request(_) | FetchError::Decode(_) => ErrorKind::Other,
        }
    }

    /// Wrap a transport error, separating TLS failures from the rest.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if is_tls_failure(&err) {
            FetchError::SecureTransport(err)
        } else {
            FetchError::Request(err)
        }
    }
}

/// reqwest reports handshake and certificate problems as connect errors; the
/// TLS layer only shows up in the source chain.
fn is_tls_failure(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        let msg = cause.to_string().to_lowercase();
        if ["tls", "ssl", "certificate", "handshake"]
            .iter()
            .any(|needle| msg.contains(needle))
        {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Source of historical hourly observations.
#[async_trait]
pub trait HistoryProvider: Send + Sync + Debug {
    /// Raw JSON body for the hour starting at unix time `dt`.
    async fn fetch_hour(&self, lat: f64, lon: f64, dt: i64) -> Result<serde_json::Value, FetchError>;
}

/// Construct the upstream provider described by `settings`.
pub fn provider_from_settings(settings: &Settings) -> anyhow::Result<Box<dyn HistoryProvider>> {
    if settings.api_key.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "No API key configured.\n\
             Hint: run `weather-sync configure` and enter your OpenWeather API key."
        ));
    }

    let provider = OpenWeatherTimeMachine::new(
        settings.api_key.clone(),
        settings.units.clone(),
        settings.base_url.clone(),
    )?;

    Ok(Box::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{path::PathBuf, time::Duration};

    fn settings(api_key: &str) -> Settings {
        Settings {
            data_folder: PathBuf::from("data"),
            api_key: api_key.to_string(),
            cities_csv: PathBuf::from("cities.csv"),
            cities: vec![],
            db_name: PathBuf::from("weather.db"),
            units: "metric".into(),
            base_url: crate::config::DEFAULT_BASE_URL.into(),
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn status_errors_classify_as_http() {
        let err = FetchError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: "slow down".into(),
        };
        assert_eq!(err.kind(), ErrorKind::HttpStatus);
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn decode_errors_classify_as_other() {
        let err: FetchError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn provider_from_settings_errors_when_missing_api_key() {
        let err = provider_from_settings(&settings("  ")).unwrap_err();
        assert!(err.to_string().contains("No API key configured"));
    }

    #[test]
    fn provider_from_settings_works_with_key() {
        assert!(provider_from_settings(&settings("KEY")).is_ok());
    }
}
