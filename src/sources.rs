//! Collaborators the core reads from. Persistence, transport and the
//! content store behind them belong to the host application.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::UnitId;

/// Configuration key holding the target number of bookable units.
pub const TARGET_UNIT_COUNT_KEY: &str = "total_units";

/// Configuration key holding the primary private-event store (`date -> entry`).
pub const PRIVATE_EVENTS_KEY: &str = "private_events";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("operation not supported by this source")]
    Unsupported,
}

/// Key-value configuration store.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }
}

/// Flat `"<unit>_<date>_<segment>" -> record` status map.
pub trait StatusMapSource: Send + Sync {
    fn get_all(&self) -> HashMap<String, Value>;

    /// Merge cells into the map. A `null` value removes the cell.
    fn update(&self, _cells: HashMap<String, Value>) -> Result<(), SourceError> {
        Err(SourceError::Unsupported)
    }
}

/// Directory of bookable units, optionally able to create missing ones.
#[async_trait]
pub trait UnitDirectory: Send + Sync {
    async fn list_published_units(&self) -> Vec<UnitId>;

    /// Create the unit for `ordinal` (1-based) if it does not exist yet.
    async fn materialize_unit(&self, ordinal: u32) -> Result<Option<UnitId>, SourceError>;
}

/// Third-party private-event feed (calendar sync and the like).
#[async_trait]
pub trait PrivateEventFeed: Send + Sync {
    async fn fetch_private_events(&self) -> Result<HashMap<String, Value>, SourceError>;
}

/// Read a non-negative count from a loosely typed configuration value.
pub fn value_as_count(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n.min(u32::MAX as u64) as u32),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}
