use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::*;
use crate::sources::StatusMapSource;

/// Decoded view of the raw status map.
#[derive(Debug, Default)]
pub struct StatusSnapshot {
    cells: HashMap<CellKey, CellRecord>,
    /// Unit ids seen in integer keys and `accommodation_id` fields, sorted.
    unit_hints: BTreeSet<UnitId>,
    /// Dates carrying at least one `private_event` cell, with the smallest non-empty title.
    private_event_cells: HashMap<NaiveDate, String>,
    skipped_keys: usize,
}

impl StatusSnapshot {
    pub fn decode(raw: HashMap<String, serde_json::Value>) -> Self {
        let mut snap = Self::default();
        for (key, value) in raw {
            let record = CellRecord::decode(value);
            if let Some(id) = &record.accommodation_id {
                snap.unit_hints.insert(id.clone());
            }
            let Some(cell_key) = CellKey::parse(&key) else {
                snap.skipped_keys += 1;
                continue;
            };
            if let UnitId::Num(_) = cell_key.unit {
                snap.unit_hints.insert(cell_key.unit.clone());
            }
            if record.state == CellState::Known(CellStatus::PrivateEvent) {
                let title = record.event_title().unwrap_or_default().to_string();
                let slot = snap.private_event_cells.entry(cell_key.date).or_default();
                if slot.is_empty() || (!title.is_empty() && title < *slot) {
                    *slot = title;
                }
            }
            snap.cells.insert(cell_key, record);
        }
        if snap.skipped_keys > 0 {
            debug!(skipped = snap.skipped_keys, "status map keys without a parseable cell key");
        }
        snap
    }

    pub fn get(&self, unit: &UnitId, date: NaiveDate, segment: &str) -> Option<&CellRecord> {
        self.cells.get(&CellKey::new(unit.clone(), date, segment))
    }

    pub fn unit_hints(&self) -> impl Iterator<Item = &UnitId> {
        self.unit_hints.iter()
    }

    pub fn private_event_cells(&self) -> &HashMap<NaiveDate, String> {
        &self.private_event_cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Owns the status-map source and its decoded snapshot.
pub struct StatusCache {
    source: Arc<dyn StatusMapSource>,
    snapshot: RwLock<Option<Arc<StatusSnapshot>>>,
}

impl StatusCache {
    pub fn new(source: Arc<dyn StatusMapSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &Arc<dyn StatusMapSource> {
        &self.source
    }

    /// The current snapshot, decoding the source on first read after a clear.
    pub async fn snapshot(&self) -> Arc<StatusSnapshot> {
        if let Some(snap) = self.snapshot.read().await.as_ref() {
            return snap.clone();
        }
        let mut guard = self.snapshot.write().await;
        if let Some(snap) = guard.as_ref() {
            return snap.clone();
        }
        let snap = Arc::new(StatusSnapshot::decode(self.source.get_all()));
        metrics::counter!(crate::observability::CACHE_REBUILDS_TOTAL, "cache" => "status").increment(1);
        debug!(cells = snap.len(), "status snapshot rebuilt");
        *guard = Some(snap.clone());
        snap
    }

    pub async fn clear_cache(&self) {
        *self.snapshot.write().await = None;
    }
}
