//! Local forecast storage for Skycast.
//!
//! A single `weather` table holding the latest synced snapshot, keyed by
//! normalized day.

pub mod store;

pub use store::{ForecastStore, SCHEMA_VERSION};
