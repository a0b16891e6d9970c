use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::model::*;
use crate::rules::context::{self, ValidationContext};
use crate::sources::*;

use super::dates::{days_inclusive, format_key, parse_date, parse_range};
use super::inventory::source_failure;
use super::selection::SelectionValidator;
use super::status::StatusCache;
use super::Failure;

pub type PrivateEventMap = BTreeMap<NaiveDate, PrivateEventEntry>;

struct CachedEvents {
    loaded_at: Instant,
    events: Arc<PrivateEventMap>,
}

/// Discovers private-event dates from every source and enforces
/// full-property booking on them.
///
/// Sources merge in a fixed order, later ones overwriting earlier ones on
/// the same date: primary store, then structured source (status-map cells),
/// then the external feed.
pub struct PrivateEventValidator {
    config: Arc<dyn ConfigStore>,
    status: Arc<StatusCache>,
    feed: Option<Arc<dyn PrivateEventFeed>>,
    selection: SelectionValidator,
    settings: CoreConfig,
    cache: RwLock<Option<CachedEvents>>,
}

impl PrivateEventValidator {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        status: Arc<StatusCache>,
        feed: Option<Arc<dyn PrivateEventFeed>>,
        selection: SelectionValidator,
        settings: CoreConfig,
    ) -> Self {
        Self {
            config,
            status,
            feed,
            selection,
            settings,
            cache: RwLock::new(None),
        }
    }

    pub fn selection(&self) -> &SelectionValidator {
        &self.selection
    }

    // ── Discovery ────────────────────────────────────────

    /// The merged map, reloaded when older than the TTL.
    pub async fn all_events(&self) -> Arc<PrivateEventMap> {
        let ttl = self.settings.private_event_ttl;
        if let Some(c) = self.cache.read().await.as_ref()
            && c.loaded_at.elapsed() < ttl
        {
            return c.events.clone();
        }
        let mut guard = self.cache.write().await;
        if let Some(c) = guard.as_ref()
            && c.loaded_at.elapsed() < ttl
        {
            return c.events.clone();
        }
        let events = Arc::new(self.merge_sources().await);
        metrics::counter!(crate::observability::CACHE_REBUILDS_TOTAL, "cache" => "private_events").increment(1);
        info!(dates = events.len(), "private-event map merged");
        *guard = Some(CachedEvents {
            loaded_at: Instant::now(),
            events: events.clone(),
        });
        events
    }

    /// All entries in `[start, end]`, blocking or not.
    pub async fn private_events_in_range(&self, start: NaiveDate, end: NaiveDate) -> PrivateEventMap {
        self.all_events()
            .await
            .range(start..=end)
            .map(|(d, e)| (*d, e.clone()))
            .collect()
    }

    /// Entries in `[start, end]` that block partial bookings.
    pub async fn blocking_events_in_range(&self, start: NaiveDate, end: NaiveDate) -> PrivateEventMap {
        let all = self.all_events().await;
        days_inclusive(start, end)
            .filter_map(|d| all.get(&d).filter(|e| e.blocks_booking()).map(|e| (d, e.clone())))
            .collect()
    }

    pub async fn is_blocked(&self, date: NaiveDate) -> bool {
        self.all_events()
            .await
            .get(&date)
            .is_some_and(PrivateEventEntry::blocks_booking)
    }

    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
    }

    async fn merge_sources(&self) -> PrivateEventMap {
        let mut merged = PrivateEventMap::new();

        if let Some(stored) = self.config.get(PRIVATE_EVENTS_KEY) {
            merge_raw(&mut merged, stored_entries(&stored), EventSource::PrimaryStore);
        }

        let snapshot = self.status.snapshot().await;
        for (date, title) in snapshot.private_event_cells() {
            merged.insert(*date, PrivateEventEntry::active(title.clone(), EventSource::StructuredSource));
        }

        if let Some(feed) = &self.feed {
            match tokio::time::timeout(self.settings.feed_timeout, feed.fetch_private_events()).await {
                Ok(Ok(raw)) => merge_raw(&mut merged, raw, EventSource::ExternalFeed),
                Ok(Err(e)) => {
                    source_failure("feed");
                    warn!("private-event feed failed, using local sources only: {e}");
                }
                Err(_) => {
                    source_failure("feed");
                    warn!(
                        timeout_ms = self.settings.feed_timeout.as_millis() as u64,
                        "private-event feed timed out, using local sources only"
                    );
                }
            }
        }

        merged
    }

    // ── Validation ───────────────────────────────────────

    /// Validate a `start_date`..`end_date` request.
    ///
    /// Passes with `has_private_event_dates = false` when no day in the range
    /// is blocked. Otherwise any selection must be a full-property booking,
    /// and the context gains `requires_full_property` and the blocking dates.
    pub async fn validate_multi_day(&self, mut ctx: ValidationContext) -> Result<ValidationContext, Failure> {
        let start = ctx.start_date().unwrap_or_default().to_string();
        let end = ctx.end_date().unwrap_or_default().to_string();
        let (start, end) = parse_range(&start, &end)?;

        let blocking = self.blocking_events_in_range(start, end).await;
        if blocking.is_empty() {
            ctx.set(context::HAS_PRIVATE_EVENT_DATES, false);
            return Ok(ctx);
        }

        if let Some(selected) = ctx.selected_units() {
            self.selection.validate_selection(&selected, &blocking, &ctx).await?;
        }

        debug!(dates = blocking.len(), "range touches private-event dates");
        let dates: Vec<Value> = blocking.keys().map(|d| Value::String(format_key(*d))).collect();
        ctx.set(context::HAS_PRIVATE_EVENT_DATES, true);
        ctx.set(context::REQUIRES_FULL_PROPERTY, true);
        ctx.set(context::PRIVATE_EVENT_DATES, Value::Array(dates));
        Ok(ctx)
    }

    /// Validate a selection for one date. Non-private dates always pass.
    pub async fn validate_single_date(
        &self,
        date: NaiveDate,
        selected: &[UnitId],
        ctx: &ValidationContext,
    ) -> Result<(), Failure> {
        let all = self.all_events().await;
        let Some(entry) = all.get(&date).filter(|e| e.blocks_booking()) else {
            return Ok(());
        };
        let events = PrivateEventMap::from([(date, entry.clone())]);
        self.selection.validate_selection(selected, &events, ctx).await
    }
}

/// The primary store holds either `{date: entry}` or `[{date, ...entry}]`.
fn stored_entries(stored: &Value) -> HashMap<String, Value> {
    match stored {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let date = item.get("date")?.as_str()?;
                Some((date.to_string(), item.clone()))
            })
            .collect(),
        _ => {
            warn!("primary private-event store is neither an object nor a list; ignored");
            HashMap::new()
        }
    }
}

fn merge_raw(into: &mut PrivateEventMap, raw: HashMap<String, Value>, source: EventSource) {
    for (key, value) in raw {
        let Ok(date) = parse_date("private_event_date", &key) else {
            debug!(key = %key, ?source, "private-event entry with invalid date skipped");
            continue;
        };
        match PrivateEventEntry::decode(&value, source) {
            Some(entry) => {
                into.insert(date, entry);
            }
            None => debug!(%date, ?source, "malformed private-event entry skipped"),
        }
    }
}
