use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{truthy, UnitId};

pub const DATE: &str = "date";
pub const START_DATE: &str = "start_date";
pub const END_DATE: &str = "end_date";
pub const SELECTED_UNITS: &str = "selected_units";
pub const BOOK_ALL: &str = "book_all";
pub const DISPLAY_STATUS: &str = "display_status";
pub const REQUIRES_FULL_PROPERTY: &str = "requires_full_property";
pub const HAS_PRIVATE_EVENT_DATES: &str = "has_private_event_dates";
pub const PRIVATE_EVENT_DATES: &str = "private_event_dates";

/// String-keyed payload threaded through a rule pipeline. Rules read the
/// request fields and add derived keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationContext(Map<String, Value>);

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn for_date(date: &str) -> Self {
        Self::new().with(DATE, date)
    }

    pub fn for_range(start: &str, end: &str) -> Self {
        Self::new().with(START_DATE, start).with(END_DATE, end)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_selection(self, units: &[UnitId]) -> Self {
        let list: Vec<Value> = units
            .iter()
            .map(|u| serde_json::to_value(u).unwrap_or(Value::Null))
            .collect();
        self.with(SELECTED_UNITS, Value::Array(list))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Overwrite with every key of `other`.
    pub fn merge(&mut self, other: ValidationContext) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    // ── Typed accessors ──────────────────────────────────

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn date(&self) -> Option<&str> {
        self.str_field(DATE)
    }

    pub fn start_date(&self) -> Option<&str> {
        self.str_field(START_DATE)
    }

    pub fn end_date(&self) -> Option<&str> {
        self.str_field(END_DATE)
    }

    pub fn display_status(&self) -> Option<&str> {
        self.str_field(DISPLAY_STATUS)
    }

    /// `None` when no selection was supplied. Accepts an array of ids or a
    /// comma-separated string; entries that are not unit ids are dropped.
    pub fn selected_units(&self) -> Option<Vec<UnitId>> {
        match self.0.get(SELECTED_UNITS)? {
            Value::Array(items) => Some(items.iter().filter_map(UnitId::from_value).collect()),
            Value::String(s) => Some(s.split(',').filter_map(UnitId::parse).collect()),
            Value::Null => None,
            other => UnitId::from_value(other).map(|u| vec![u]),
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(truthy)
    }

    pub fn book_all(&self) -> bool {
        self.flag(BOOK_ALL)
    }

    /// Stable hash of the content, used to key cached rule selections.
    pub fn content_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        serde_json::to_string(&self.0).unwrap_or_default().hash(&mut h);
        h.finish()
    }
}

impl From<Map<String, Value>> for ValidationContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
