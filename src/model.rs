use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Segment used for whole-day cells.
pub const FULL_DAY_SEGMENT: &str = "full";

/// Opaque bookable unit identifier. Directories hand out integers; some
/// imported data uses names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitId {
    Num(i64),
    Name(String),
}

impl UnitId {
    /// Integer if the text is one, otherwise a name. Empty text is not a unit.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        Some(match s.parse::<i64>() {
            Ok(n) => UnitId::Num(n),
            Err(_) => UnitId::Name(s.to_string()),
        })
    }

    /// Decode from JSON: integers, numeric strings and plain names.
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_i64().map(UnitId::Num),
            Value::String(s) => UnitId::parse(s),
            _ => None,
        }
    }
}

impl From<i64> for UnitId {
    fn from(n: i64) -> Self {
        UnitId::Num(n)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        UnitId::Name(s.to_string())
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Num(n) => write!(f, "{n}"),
            UnitId::Name(s) => f.write_str(s),
        }
    }
}

/// Recognized cell statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Booked,
    Pending,
    Blocked,
    External,
    PrivateEvent,
}

impl CellStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booked" => Some(CellStatus::Booked),
            "pending" => Some(CellStatus::Pending),
            "blocked" => Some(CellStatus::Blocked),
            "external" => Some(CellStatus::External),
            "private_event" => Some(CellStatus::PrivateEvent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CellStatus::Booked => "booked",
            CellStatus::Pending => "pending",
            CellStatus::Blocked => "blocked",
            CellStatus::External => "external",
            CellStatus::PrivateEvent => "private_event",
        }
    }

    /// True for the statuses that take a unit out of the available pool.
    /// Private-event markers are date-level and enforced by the validator.
    pub fn occupies(self) -> bool {
        !matches!(self, CellStatus::PrivateEvent)
    }
}

/// A cell status after boundary decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellState {
    Known(CellStatus),
    /// A string we do not understand. Counts as available.
    Unrecognized(String),
    /// Structurally wrong (nested object, missing status, number...). Counts as available.
    Corrupted,
}

impl CellState {
    /// Decode the `status` of a raw record.
    ///
    /// A bare string is accepted as the status itself. Objects must carry a
    /// string `status`; anything else is corrupted.
    pub fn decode(raw: &Value) -> Self {
        let status = match raw {
            Value::String(s) => s.as_str(),
            Value::Object(map) => match map.get("status") {
                Some(Value::String(s)) => s.as_str(),
                _ => return CellState::Corrupted,
            },
            _ => return CellState::Corrupted,
        };
        match CellStatus::parse(status) {
            Some(st) => CellState::Known(st),
            None => CellState::Unrecognized(status.to_string()),
        }
    }

    pub fn status(&self) -> Option<CellStatus> {
        match self {
            CellState::Known(st) => Some(*st),
            _ => None,
        }
    }
}

/// Composite cell key `<unit>_<YYYY-MM-DD>_<segment>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    pub unit: UnitId,
    pub date: NaiveDate,
    pub segment: String,
}

impl CellKey {
    pub fn new(unit: UnitId, date: NaiveDate, segment: impl Into<String>) -> Self {
        Self {
            unit,
            date,
            segment: segment.into(),
        }
    }

    /// Split from the right so unit names may themselves contain `_`.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.rsplitn(3, '_');
        let segment = parts.next()?;
        let date = parts.next()?;
        let unit = parts.next()?;
        if segment.is_empty() {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        Some(Self::new(UnitId::parse(unit)?, date, segment))
    }

    pub fn encode(&self) -> String {
        format!("{}_{}_{}", self.unit, self.date.format("%Y-%m-%d"), self.segment)
    }
}

/// A decoded cell record. Fields other than `status` and `accommodation_id`
/// are carried but never interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub state: CellState,
    pub accommodation_id: Option<UnitId>,
    pub raw: Value,
}

impl CellRecord {
    pub fn decode(raw: Value) -> Self {
        let accommodation_id = raw
            .get("accommodation_id")
            .and_then(UnitId::from_value);
        Self {
            state: CellState::decode(&raw),
            accommodation_id,
            raw,
        }
    }

    pub fn event_title(&self) -> Option<&str> {
        self.raw.get("event_title").and_then(Value::as_str)
    }
}

/// Per-date aggregate. `available = total - (booked + pending + blocked + external)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCounts {
    pub booked: u32,
    pub pending: u32,
    pub blocked: u32,
    pub external: u32,
    pub available: u32,
}

impl UnitCounts {
    pub fn with_total(total: u32) -> Self {
        Self {
            available: total,
            ..Self::default()
        }
    }

    pub fn total(&self) -> u32 {
        self.booked + self.pending + self.blocked + self.external + self.available
    }

    pub fn is_full(&self) -> bool {
        self.available == 0
    }

    /// Move one unit from `available` into the bucket for `status`.
    /// Non-occupying statuses and an exhausted pool leave counts untouched.
    pub(crate) fn record(&mut self, status: CellStatus) {
        if !status.occupies() || self.available == 0 {
            return;
        }
        match status {
            CellStatus::Booked => self.booked += 1,
            CellStatus::Pending => self.pending += 1,
            CellStatus::Blocked => self.blocked += 1,
            CellStatus::External => self.external += 1,
            CellStatus::PrivateEvent => return,
        }
        self.available -= 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Active,
    Inactive,
}

/// Where a private-event entry came from. Merge order follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    PrimaryStore,
    StructuredSource,
    ExternalFeed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateEventEntry {
    pub is_private_event: bool,
    pub event_title: String,
    pub status: EventStatus,
    pub source: EventSource,
}

impl PrivateEventEntry {
    pub fn active(title: impl Into<String>, source: EventSource) -> Self {
        Self {
            is_private_event: true,
            event_title: title.into(),
            status: EventStatus::Active,
            source,
        }
    }

    /// Decode a stored entry. Accepts loose truthy flags and the legacy
    /// `mode: "private"` marker. Returns `None` for non-objects.
    pub fn decode(raw: &Value, source: EventSource) -> Option<Self> {
        let map = raw.as_object()?;
        let flagged = map.get("is_private_event").is_some_and(truthy);
        let legacy = map.get("mode").and_then(Value::as_str) == Some("private");
        let status = match map.get("status").and_then(Value::as_str) {
            Some("inactive") => EventStatus::Inactive,
            _ => EventStatus::Active,
        };
        Some(Self {
            is_private_event: flagged || legacy,
            event_title: map
                .get("event_title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status,
            source,
        })
    }

    pub fn blocks_booking(&self) -> bool {
        self.is_private_event && self.status == EventStatus::Active
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "is_private_event": self.is_private_event,
            "event_title": self.event_title,
            "status": self.status,
        })
    }
}

pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "yes" | "on"),
        _ => false,
    }
}
