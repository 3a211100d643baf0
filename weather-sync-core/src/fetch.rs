//! Hour-by-hour download of one city's window.

use serde_json::Value;
use std::time::Duration;

use crate::{
    model::{CityTarget, HOUR, Window},
    provider::{ErrorKind, HistoryProvider},
};

/// What the fetch loop does after a failed hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    RetrySameHour,
    AdvanceNextHour,
}

/// Only a TLS failure is worth repeating; any other failure gives the hour up.
pub const fn next_step(kind: ErrorKind) -> NextStep {
    match kind {
        ErrorKind::SecureTransport => NextStep::RetrySameHour,
        ErrorKind::HttpStatus | ErrorKind::Other => NextStep::AdvanceNextHour,
    }
}

/// Request every hour of `window` for `city`, tagging each body with `"City"`.
///
/// Failures are logged and followed by a `backoff` pause; they never abort
/// the window. All hours are attempted before returning.
pub async fn fetch_window<P>(
    provider: &P,
    city: &CityTarget,
    window: Window,
    backoff: Duration,
) -> Vec<Value>
where
    P: HistoryProvider + ?Sized,
{
    let mut hourly = Vec::new();
    let mut dt = window.start;

    while dt <= window.end {
        match provider.fetch_hour(city.lat, city.lon, dt).await {
            Ok(mut body) => {
                if let Value::Object(map) = &mut body {
                    map.insert("City".to_string(), Value::String(city.name.clone()));
                }
                tracing::info!(city = %city.name, dt, "data downloaded: {body}");
                hourly.push(body);
            }
            Err(err) => {
                let step = next_step(err.kind());
                tracing::warn!(city = %city.name, dt, ?step, "fetch failed: {err}");
                tokio::time::sleep(backoff).await;

                if step == NextStep::RetrySameHour {
                    continue;
                }
            }
        }

        dt += HOUR;
    }

    hourly
}
