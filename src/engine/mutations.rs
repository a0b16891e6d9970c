use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::model::*;
use crate::notify::Invalidation;
use crate::rules::{Rule, RuleContext};
use crate::sources::{SourceError, PRIVATE_EVENTS_KEY};

use super::dates::{format_key, parse_date};
use super::{BookingCore, Failure, RegistrationError};

impl BookingCore {
    // ── Status map ───────────────────────────────────────

    /// Write cells (`null` removes one), drop every derived cache and notify.
    pub async fn update_cell_statuses(&self, cells: HashMap<String, Value>) -> Result<(), SourceError> {
        let written = cells.len();
        let unparsable = cells.keys().filter(|k| CellKey::parse(k).is_none()).count();
        if unparsable > 0 {
            warn!(unparsable, "cell keys that are not <unit>_<date>_<segment> will be ignored by lookups");
        }
        self.status.source().update(cells)?;
        self.handle_invalidation(&Invalidation::StatusMapChanged).await;
        self.notify.send(Invalidation::StatusMapChanged);
        info!(cells = written, "cell statuses updated");
        Ok(())
    }

    // ── Private events ───────────────────────────────────

    pub async fn upsert_private_event(&self, date: &str, title: &str, active: bool) -> Result<(), Failure> {
        let date = parse_date("private_event_date", date)?;
        let key = format_key(date);
        let mut entry = PrivateEventEntry::active(title, EventSource::PrimaryStore);
        if !active {
            entry.status = EventStatus::Inactive;
        }

        let mut stored = self.stored_private_events();
        stored.insert(key.clone(), entry.to_value());
        self.config.set(PRIVATE_EVENTS_KEY, Value::Object(stored));

        self.private_event_changed(key).await;
        Ok(())
    }

    /// Returns false when the primary store had no entry for `date`.
    pub async fn delete_private_event(&self, date: &str) -> Result<bool, Failure> {
        let date = parse_date("private_event_date", date)?;
        let key = format_key(date);
        let mut stored = self.stored_private_events();
        if stored.remove(&key).is_none() {
            return Ok(false);
        }
        self.config.set(PRIVATE_EVENTS_KEY, Value::Object(stored));

        self.private_event_changed(key).await;
        Ok(true)
    }

    /// Primary store as `date -> entry`. A list-shaped store is rewritten into
    /// that form on the first write.
    fn stored_private_events(&self) -> Map<String, Value> {
        match self.config.get(PRIVATE_EVENTS_KEY) {
            Some(Value::Object(map)) => map,
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| {
                    let date = item.get("date")?.as_str()?.to_string();
                    Some((date, item))
                })
                .collect(),
            _ => Map::new(),
        }
    }

    async fn private_event_changed(&self, date: String) {
        let event = Invalidation::PrivateEventChanged { date: Some(date) };
        self.handle_invalidation(&event).await;
        self.notify.send(event);
    }

    // ── Rules ────────────────────────────────────────────

    pub fn register_rule(&self, rule: Arc<dyn Rule>) -> Result<(), RegistrationError> {
        self.rules.register(rule)?;
        self.notify.send(Invalidation::RulesChanged);
        Ok(())
    }

    pub fn unregister_rule(&self, id: &str) -> bool {
        let removed = self.rules.unregister(id);
        if removed {
            self.notify.send(Invalidation::RulesChanged);
        }
        removed
    }

    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> bool {
        let found = self.rules.set_enabled(id, enabled);
        if found {
            self.notify.send(Invalidation::RulesChanged);
        }
        found
    }

    pub fn register_context_alias(&self, alias: &str, context: RuleContext) {
        self.rules.register_context_alias(alias, context);
        self.notify.send(Invalidation::RulesChanged);
    }
}
