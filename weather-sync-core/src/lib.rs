//! Core library for the `weather-sync` tool.
//!
//! This crate defines:
//! - Settings loading and the city list
//! - The upstream history provider and the hour-by-hour fetch loop
//! - The on-disk window cache and the normalizer
//! - The SQLite city registry and observation store
//! - The per-city incremental sync
//!
//! It is used by `weather-sync-cli`, but can also be driven from other binaries.

pub mod cache;
pub mod cities;
pub mod config;
pub mod fetch;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod store;
pub mod sync;

pub use cache::{CachedPayload, WindowCache};
pub use cities::CityCatalogue;
pub use config::Settings;
pub use model::{CityResume, CityTarget, HourlyRow, SyncWindow, Window};
pub use provider::{FetchError, HistoryProvider};
pub use store::WeatherStore;
pub use sync::{SyncReport, Synchronizer};
