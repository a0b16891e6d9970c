use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::limits::MAX_SYNTHETIC_UNITS;
use crate::model::UnitId;
use crate::sources::*;

use super::status::StatusCache;

/// Which step of the resolution cascade produced the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InventorySource {
    Directory,
    Materialized,
    StatusMap,
    Synthetic,
}

impl InventorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            InventorySource::Directory => "directory",
            InventorySource::Materialized => "materialized",
            InventorySource::StatusMap => "status_map",
            InventorySource::Synthetic => "synthetic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInventory {
    pub units: Vec<UnitId>,
    pub source: InventorySource,
}

impl ResolvedInventory {
    pub fn contains(&self, unit: &UnitId) -> bool {
        self.units.contains(unit)
    }
}

/// Finds the authoritative, never-empty list of bookable units.
///
/// Resolution order, first non-empty wins:
/// 1. published units from the directory
/// 2. materialize `total_units` units through the directory, then re-list
/// 3. unit ids found in the status map (integer keys, `accommodation_id` fields)
/// 4. the synthetic range `1..=max(1, total_units)`
pub struct InventoryResolver {
    directory: Arc<dyn UnitDirectory>,
    config: Arc<dyn ConfigStore>,
    status: Arc<StatusCache>,
    settings: CoreConfig,
    memo: RwLock<Option<Arc<ResolvedInventory>>>,
}

impl InventoryResolver {
    pub fn new(
        directory: Arc<dyn UnitDirectory>,
        config: Arc<dyn ConfigStore>,
        status: Arc<StatusCache>,
        settings: CoreConfig,
    ) -> Self {
        Self {
            directory,
            config,
            status,
            settings,
            memo: RwLock::new(None),
        }
    }

    pub async fn resolve(&self) -> Arc<ResolvedInventory> {
        if let Some(inv) = self.memo.read().await.as_ref() {
            return inv.clone();
        }
        let mut guard = self.memo.write().await;
        if let Some(inv) = guard.as_ref() {
            return inv.clone();
        }
        let inv = Arc::new(self.resolve_uncached().await);
        metrics::counter!(crate::observability::CACHE_REBUILDS_TOTAL, "cache" => "inventory").increment(1);
        info!(
            units = inv.units.len(),
            source = inv.source.as_str(),
            "inventory resolved"
        );
        *guard = Some(inv.clone());
        inv
    }

    pub async fn list_units(&self) -> Vec<UnitId> {
        self.resolve().await.units.clone()
    }

    pub async fn count_units(&self) -> usize {
        self.resolve().await.units.len()
    }

    pub async fn unit_exists(&self, unit: &UnitId) -> bool {
        self.resolve().await.contains(unit)
    }

    pub async fn clear_cache(&self) {
        *self.memo.write().await = None;
    }

    fn target_count(&self) -> u32 {
        self.config
            .get(TARGET_UNIT_COUNT_KEY)
            .as_ref()
            .and_then(value_as_count)
            .unwrap_or(0)
    }

    async fn resolve_uncached(&self) -> ResolvedInventory {
        let units = dedup(self.directory.list_published_units().await);
        if !units.is_empty() {
            return ResolvedInventory {
                units,
                source: InventorySource::Directory,
            };
        }

        let target = self.target_count();
        if target > 0 {
            fallback_metric(InventorySource::Materialized);
            let budget = self.settings.materialize_budget;
            if tokio::time::timeout(budget, self.materialize(target)).await.is_err() {
                source_failure("directory");
                warn!(?budget, "materialization budget exhausted");
            }
            let units = dedup(self.directory.list_published_units().await);
            if !units.is_empty() {
                return ResolvedInventory {
                    units,
                    source: InventorySource::Materialized,
                };
            }
        }

        fallback_metric(InventorySource::StatusMap);
        let snapshot = self.status.snapshot().await;
        let units: Vec<UnitId> = snapshot.unit_hints().cloned().collect();
        if !units.is_empty() {
            warn!(units = units.len(), "no published units; inventory recovered from status map");
            return ResolvedInventory {
                units,
                source: InventorySource::StatusMap,
            };
        }

        fallback_metric(InventorySource::Synthetic);
        let n = target.clamp(1, MAX_SYNTHETIC_UNITS);
        warn!(units = n, "no inventory signal; using synthetic unit range");
        ResolvedInventory {
            units: (1..=n as i64).map(UnitId::Num).collect(),
            source: InventorySource::Synthetic,
        }
    }

    /// Best effort: stops at the first error or timeout. The caller bounds
    /// the whole pass with `materialize_budget`.
    async fn materialize(&self, target: u32) {
        let target = target.min(self.settings.max_materialize);
        for ordinal in 1..=target {
            let call = self.directory.materialize_unit(ordinal);
            match tokio::time::timeout(self.settings.materialize_timeout, call).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    source_failure("directory");
                    warn!("materializing unit {ordinal} failed: {e}");
                    return;
                }
                Err(_) => {
                    source_failure("directory");
                    warn!("materializing unit {ordinal} timed out");
                    return;
                }
            }
        }
    }
}

fn dedup(units: Vec<UnitId>) -> Vec<UnitId> {
    let mut seen = HashSet::with_capacity(units.len());
    units.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

fn fallback_metric(step: InventorySource) {
    metrics::counter!(crate::observability::INVENTORY_FALLBACK_TOTAL, "step" => step.as_str()).increment(1);
}

pub(super) fn source_failure(source: &'static str) {
    metrics::counter!(crate::observability::SOURCE_FAILURES_TOTAL, "source" => source).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::*;
    use serde_json::json;
    use std::time::Duration;

    fn resolver(
        dir: InMemoryDirectory,
        cfg: InMemoryConfig,
        map: InMemoryStatusMap,
    ) -> InventoryResolver {
        let status = Arc::new(StatusCache::new(Arc::new(map)));
        InventoryResolver::new(Arc::new(dir), Arc::new(cfg), status, CoreConfig::default())
    }

    fn nums(ns: &[i64]) -> Vec<UnitId> {
        ns.iter().map(|n| UnitId::Num(*n)).collect()
    }

    #[tokio::test]
    async fn directory_wins() {
        let r = resolver(
            InMemoryDirectory::with_units(nums(&[5, 2, 5])),
            InMemoryConfig::new().with(TARGET_UNIT_COUNT_KEY, json!(10)),
            InMemoryStatusMap::from_cells([("9_2026-01-01_full", json!("booked"))]),
        );
        let inv = r.resolve().await;
        assert_eq!(inv.units, nums(&[5, 2]));
        assert_eq!(inv.source, InventorySource::Directory);
    }

    #[tokio::test]
    async fn materializes_target_count() {
        let r = resolver(
            InMemoryDirectory::new().materializing(),
            InMemoryConfig::new().with(TARGET_UNIT_COUNT_KEY, json!("3")),
            InMemoryStatusMap::new(),
        );
        let inv = r.resolve().await;
        assert_eq!(inv.units, nums(&[1, 2, 3]));
        assert_eq!(inv.source, InventorySource::Materialized);
    }

    #[tokio::test]
    async fn falls_back_to_status_map_keys_and_accommodation_ids() {
        let r = resolver(
            InMemoryDirectory::new(),
            InMemoryConfig::new().with(TARGET_UNIT_COUNT_KEY, json!(2)),
            InMemoryStatusMap::from_cells([
                ("7_2026-01-01_full", json!({"status": "booked"})),
                ("3_2026-01-02_full", json!({"status": "pending"})),
                ("7_2026-01-03_full", json!({"status": "booked"})),
                ("orphan", json!({"status": "booked", "accommodation_id": 11})),
            ]),
        );
        let inv = r.resolve().await;
        assert_eq!(inv.units, nums(&[3, 7, 11]));
        assert_eq!(inv.source, InventorySource::StatusMap);
    }

    #[tokio::test]
    async fn synthetic_range_when_nothing_else() {
        let r = resolver(
            InMemoryDirectory::new(),
            InMemoryConfig::new().with(TARGET_UNIT_COUNT_KEY, json!(4)),
            InMemoryStatusMap::new(),
        );
        assert_eq!(r.list_units().await, nums(&[1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn never_empty_without_config() {
        let r = resolver(InMemoryDirectory::new(), InMemoryConfig::new(), InMemoryStatusMap::new());
        let inv = r.resolve().await;
        assert_eq!(inv.units, nums(&[1]));
        assert_eq!(inv.source, InventorySource::Synthetic);
        assert_eq!(r.count_units().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn materialize_timeout_degrades() {
        let r = resolver(
            InMemoryDirectory::new()
                .materializing()
                .with_materialize_delay(Duration::from_secs(30)),
            InMemoryConfig::new().with(TARGET_UNIT_COUNT_KEY, json!(2)),
            InMemoryStatusMap::new(),
        );
        let inv = r.resolve().await;
        assert_eq!(inv.source, InventorySource::Synthetic);
        assert_eq!(inv.units, nums(&[1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_materialization_is_cut_off_by_budget() {
        let settings = CoreConfig::default();
        let dir = InMemoryDirectory::new()
            .materializing()
            .with_materialize_delay(Duration::from_millis(1900));
        let status = Arc::new(StatusCache::new(Arc::new(InMemoryStatusMap::new())));
        let r = InventoryResolver::new(
            Arc::new(dir),
            Arc::new(InMemoryConfig::new().with(TARGET_UNIT_COUNT_KEY, json!(500))),
            status,
            settings.clone(),
        );

        let started = tokio::time::Instant::now();
        let inv = r.resolve().await;
        assert!(started.elapsed() <= settings.materialize_budget + Duration::from_millis(1));
        // The units that did materialize within the budget are published.
        assert_eq!(inv.source, InventorySource::Materialized);
        assert_eq!(inv.units, nums(&[1, 2, 3, 4, 5]));
    }

    #[tokio::test]
    async fn memoized_until_cleared() {
        let dir = Arc::new(InMemoryDirectory::with_units(nums(&[1])));
        let status = Arc::new(StatusCache::new(Arc::new(InMemoryStatusMap::new())));
        let r = InventoryResolver::new(
            dir.clone(),
            Arc::new(InMemoryConfig::new()),
            status,
            CoreConfig::default(),
        );
        assert_eq!(r.count_units().await, 1);

        dir.publish(UnitId::Num(2));
        assert_eq!(r.count_units().await, 1);

        r.clear_cache().await;
        assert_eq!(r.count_units().await, 2);
        assert!(r.unit_exists(&UnitId::Num(2)).await);
        assert!(!r.unit_exists(&UnitId::Num(3)).await);
    }
}
