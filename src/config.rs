use std::time::Duration;

use serde::Deserialize;

use crate::limits::MAX_MATERIALIZED_UNITS;
use crate::model::FULL_DAY_SEGMENT;

/// Tunables for one core instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// How long the merged private-event map is trusted before re-merging.
    #[serde(with = "secs")]
    pub private_event_ttl: Duration,
    /// Bound on a single external-feed fetch.
    #[serde(with = "millis")]
    pub feed_timeout: Duration,
    /// Bound on a single unit materialization call.
    #[serde(with = "millis")]
    pub materialize_timeout: Duration,
    /// Bound on the whole materialization pass, however many calls it makes.
    #[serde(with = "millis")]
    pub materialize_budget: Duration,
    pub max_materialize: u32,
    /// Segment the counter reads for whole-day availability.
    pub segment: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            private_event_ttl: Duration::from_secs(300),
            feed_timeout: Duration::from_secs(2),
            materialize_timeout: Duration::from_secs(2),
            materialize_budget: Duration::from_secs(10),
            max_materialize: MAX_MATERIALIZED_UNITS,
            segment: FULL_DAY_SEGMENT.to_string(),
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by `FULLHOUSE_*` environment variables.
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let num = |k: &str| lookup(k).and_then(|s| s.trim().parse::<u64>().ok());

        if let Some(secs) = num("FULLHOUSE_PRIVATE_EVENT_TTL_SECS") {
            cfg.private_event_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = num("FULLHOUSE_FEED_TIMEOUT_MS") {
            cfg.feed_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = num("FULLHOUSE_MATERIALIZE_TIMEOUT_MS") {
            cfg.materialize_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = num("FULLHOUSE_MATERIALIZE_BUDGET_MS") {
            cfg.materialize_budget = Duration::from_millis(ms);
        }
        if let Some(n) = num("FULLHOUSE_MAX_MATERIALIZE") {
            cfg.max_materialize = n.min(MAX_MATERIALIZED_UNITS as u64) as u32;
        }
        cfg
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
