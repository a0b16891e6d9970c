use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::debug;

use crate::model::*;

use super::dates::{check_range, days_inclusive};
use super::inventory::InventoryResolver;
use super::status::{StatusCache, StatusSnapshot};
use super::Failure;

// ── Counting ──────────────────────────────────────────────────────

/// Aggregate one date over `units`.
///
/// Every unit starts available. A recognized occupying status moves it into
/// its bucket; absent, corrupted and unrecognized cells leave it available.
pub fn count_date(snapshot: &StatusSnapshot, units: &[UnitId], date: NaiveDate, segment: &str) -> UnitCounts {
    let mut counts = UnitCounts::with_total(units.len() as u32);
    for unit in units {
        let Some(record) = snapshot.get(unit, date, segment) else {
            continue;
        };
        match &record.state {
            CellState::Known(status) => counts.record(*status),
            CellState::Corrupted => {
                debug!(%unit, %date, "corrupted cell status ignored");
            }
            CellState::Unrecognized(s) => {
                debug!(%unit, %date, status = %s, "unrecognized cell status ignored");
            }
        }
    }
    counts
}

/// Occupying status of one cell, if any.
fn occupying_status(snapshot: &StatusSnapshot, unit: &UnitId, date: NaiveDate, segment: &str) -> Option<CellStatus> {
    snapshot
        .get(unit, date, segment)
        .and_then(|r| r.state.status())
        .filter(|s| s.occupies())
}

// ── Counter ───────────────────────────────────────────────────────

/// Per-date availability over the resolved inventory, with a per-date count cache.
pub struct AvailabilityCounter {
    inventory: Arc<InventoryResolver>,
    status: Arc<StatusCache>,
    segment: String,
    counts: DashMap<NaiveDate, UnitCounts>,
    /// Bumped on every clear so a count computed before a clear is not stored after it.
    generation: AtomicU64,
}

impl AvailabilityCounter {
    pub fn new(inventory: Arc<InventoryResolver>, status: Arc<StatusCache>, segment: impl Into<String>) -> Self {
        Self {
            inventory,
            status,
            segment: segment.into(),
            counts: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn counts_for_date(&self, date: NaiveDate) -> UnitCounts {
        if let Some(c) = self.counts.get(&date) {
            return *c.value();
        }
        let generation = self.generation.load(Ordering::Acquire);
        let inv = self.inventory.resolve().await;
        let snapshot = self.status.snapshot().await;
        let counts = count_date(&snapshot, &inv.units, date, &self.segment);
        if self.generation.load(Ordering::Acquire) == generation {
            self.counts.insert(date, counts);
        }
        counts
    }

    pub async fn counts_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, UnitCounts>, Failure> {
        check_range(start, end)?;
        let mut out = BTreeMap::new();
        for date in days_inclusive(start, end) {
            out.insert(date, self.counts_for_date(date).await);
        }
        Ok(out)
    }

    /// Recognized status of a unit's cell on a date, occupying or not.
    /// `None` for an empty, corrupted or unrecognized cell.
    pub async fn status_for(&self, date: NaiveDate, unit: &UnitId) -> Option<CellStatus> {
        let snapshot = self.status.snapshot().await;
        snapshot.get(unit, date, &self.segment).and_then(|r| r.state.status())
    }

    pub async fn is_available(&self, date: NaiveDate, unit: &UnitId) -> bool {
        !self.status_for(date, unit).await.is_some_and(CellStatus::occupies)
    }

    pub async fn available_units(&self, date: NaiveDate) -> Vec<UnitId> {
        let inv = self.inventory.resolve().await;
        let snapshot = self.status.snapshot().await;
        inv.units
            .iter()
            .filter(|u| occupying_status(&snapshot, u, date, &self.segment).is_none())
            .cloned()
            .collect()
    }

    pub async fn unavailable_units_by_status(&self, date: NaiveDate) -> BTreeMap<CellStatus, Vec<UnitId>> {
        let inv = self.inventory.resolve().await;
        let snapshot = self.status.snapshot().await;
        let mut out: BTreeMap<CellStatus, Vec<UnitId>> = BTreeMap::new();
        for unit in &inv.units {
            if let Some(status) = occupying_status(&snapshot, unit, date, &self.segment) {
                out.entry(status).or_default().push(unit.clone());
            }
        }
        out
    }

    pub fn clear_cache(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.counts.clear();
    }
}
