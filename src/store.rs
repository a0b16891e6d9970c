//! In-process collaborator implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::model::UnitId;
use crate::sources::*;

// ── Configuration ────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryConfig {
    values: DashMap<String, Value>,
}

impl InMemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }
}

impl ConfigStore for InMemoryConfig {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|e| e.value().clone())
    }

    fn set(&self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }
}

// ── Status map ───────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryStatusMap {
    cells: DashMap<String, Value>,
    reads: AtomicUsize,
}

impl InMemoryStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells<K: Into<String>>(cells: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map = Self::new();
        for (k, v) in cells {
            map.cells.insert(k.into(), v);
        }
        map
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.cells.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of full reads served, for cache assertions.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl StatusMapSource for InMemoryStatusMap {
    fn get_all(&self) -> HashMap<String, Value> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.cells
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn update(&self, cells: HashMap<String, Value>) -> Result<(), SourceError> {
        for (key, value) in cells {
            if value.is_null() {
                self.cells.remove(&key);
            } else {
                self.cells.insert(key, value);
            }
        }
        Ok(())
    }
}

// ── Unit directory ───────────────────────────────────────

/// Directory backed by a list. When `materializes` is set, each call to
/// `materialize_unit(n)` publishes unit `n`.
#[derive(Default)]
pub struct InMemoryDirectory {
    published: DashMap<UnitId, usize>,
    next_seq: AtomicUsize,
    materializes: bool,
    materialize_delay: Option<Duration>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_units(units: impl IntoIterator<Item = UnitId>) -> Self {
        let dir = Self::new();
        for u in units {
            dir.publish(u);
        }
        dir
    }

    pub fn materializing(mut self) -> Self {
        self.materializes = true;
        self
    }

    /// Make every materialization take `delay` (timeout tests).
    pub fn with_materialize_delay(mut self, delay: Duration) -> Self {
        self.materialize_delay = Some(delay);
        self
    }

    pub fn publish(&self, unit: UnitId) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.published.entry(unit).or_insert(seq);
    }
}

#[async_trait]
impl UnitDirectory for InMemoryDirectory {
    async fn list_published_units(&self) -> Vec<UnitId> {
        let mut units: Vec<(usize, UnitId)> = self
            .published
            .iter()
            .map(|e| (*e.value(), e.key().clone()))
            .collect();
        units.sort_by_key(|(seq, _)| *seq);
        units.into_iter().map(|(_, u)| u).collect()
    }

    async fn materialize_unit(&self, ordinal: u32) -> Result<Option<UnitId>, SourceError> {
        if let Some(delay) = self.materialize_delay {
            tokio::time::sleep(delay).await;
        }
        if !self.materializes {
            return Ok(None);
        }
        let unit = UnitId::Num(ordinal as i64);
        self.publish(unit.clone());
        Ok(Some(unit))
    }
}

// ── External feed ────────────────────────────────────────

/// Feed that returns a fixed payload, optionally after a delay or as an error.
pub struct StaticFeed {
    events: HashMap<String, Value>,
    delay: Option<Duration>,
    fail: bool,
    fetches: AtomicUsize,
}

impl StaticFeed {
    pub fn new<K: Into<String>>(events: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            events: events.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            delay: None,
            fail: false,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::<(String, Value)>::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PrivateEventFeed for StaticFeed {
    async fn fetch_private_events(&self) -> Result<HashMap<String, Value>, SourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SourceError::Unavailable("feed offline".into()));
        }
        Ok(self.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_map_update_merges_and_deletes() {
        let map = InMemoryStatusMap::from_cells([
            ("1_2026-05-01_full", json!({"status": "booked"})),
            ("2_2026-05-01_full", json!({"status": "pending"})),
        ]);
        let mut patch = HashMap::new();
        patch.insert("1_2026-05-01_full".to_string(), Value::Null);
        patch.insert("3_2026-05-01_full".to_string(), json!({"status": "blocked"}));
        map.update(patch).unwrap();

        let all = map.get_all();
        assert_eq!(all.len(), 2);
        assert!(!all.contains_key("1_2026-05-01_full"));
        assert_eq!(all["3_2026-05-01_full"]["status"], "blocked");
        assert_eq!(map.read_count(), 1);
    }

    #[tokio::test]
    async fn directory_keeps_publish_order_and_dedupes() {
        let dir = InMemoryDirectory::with_units([UnitId::Num(3), UnitId::Num(1), UnitId::Num(3)]);
        assert_eq!(dir.list_published_units().await, vec![UnitId::Num(3), UnitId::Num(1)]);
    }

    #[tokio::test]
    async fn directory_materializes_only_when_enabled() {
        let plain = InMemoryDirectory::new();
        assert_eq!(plain.materialize_unit(1).await.unwrap(), None);
        assert!(plain.list_published_units().await.is_empty());

        let dir = InMemoryDirectory::new().materializing();
        assert_eq!(dir.materialize_unit(2).await.unwrap(), Some(UnitId::Num(2)));
        assert_eq!(dir.list_published_units().await, vec![UnitId::Num(2)]);
    }

    #[tokio::test]
    async fn failing_feed_errors() {
        let feed = StaticFeed::failing();
        assert!(feed.fetch_private_events().await.is_err());
        assert_eq!(feed.fetch_count(), 1);
    }

    #[test]
    fn config_get_or_default() {
        let cfg = InMemoryConfig::new().with(TARGET_UNIT_COUNT_KEY, json!(4));
        assert_eq!(cfg.get_or(TARGET_UNIT_COUNT_KEY, json!(0)), json!(4));
        assert_eq!(cfg.get_or("missing", json!("x")), json!("x"));
    }
}
