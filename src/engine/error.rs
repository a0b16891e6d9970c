use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::model::UnitId;

/// Details of a partial selection on private-event dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateEventViolation {
    pub dates: Vec<NaiveDate>,
    /// Dates formatted for people, e.g. `June 1, 2026`.
    pub display_dates: Vec<String>,
    pub selected_count: usize,
    pub total_count: usize,
    pub minimum_required: usize,
    /// Always true: the caller must switch to a full-property booking.
    pub requires_full_property: bool,
}

impl PrivateEventViolation {
    fn date_list(&self) -> String {
        self.display_dates.join(", ")
    }
}

/// A validation outcome the caller must act on.
///
/// Structural kinds (bad dates and ranges) and policy kinds (private events,
/// inventory) share one type so a rule pipeline can return either.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    #[error("invalid {field}: {value:?} is not a calendar date (YYYY-MM-DD)")]
    InvalidDate { field: String, value: String },

    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("range of {days} days exceeds the limit of {max}")]
    RangeTooLong { days: i64, max: i64 },

    #[error(
        "{} is reserved for a private event; all {} units must be booked (selected {})",
        .0.date_list(), .0.total_count, .0.selected_count
    )]
    SingleDateRestriction(PrivateEventViolation),

    #[error(
        "private events on {}; all {} units must be booked (selected {})",
        .0.date_list(), .0.total_count, .0.selected_count
    )]
    MultiDayRestriction(PrivateEventViolation),

    #[error("selected units unavailable on {date}: {unavailable:?}, unknown: {unknown:?}; {available_count} free")]
    InsufficientInventory {
        date: NaiveDate,
        unavailable: Vec<UnitId>,
        unknown: Vec<UnitId>,
        available_count: usize,
    },

    #[error("rule {rule_id} failed: {message}")]
    RuleFailed { rule_id: String, message: String },
}

impl Failure {
    /// Machine-readable kind, identical to the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Failure::InvalidDate { .. } => "invalid_date",
            Failure::InvalidRange { .. } => "invalid_range",
            Failure::RangeTooLong { .. } => "range_too_long",
            Failure::SingleDateRestriction(_) => "single_date_restriction",
            Failure::MultiDayRestriction(_) => "multi_day_restriction",
            Failure::InsufficientInventory { .. } => "insufficient_inventory",
            Failure::RuleFailed { .. } => "rule_failed",
        }
    }

    /// Malformed input, as opposed to a policy decision.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Failure::InvalidDate { .. } | Failure::InvalidRange { .. } | Failure::RangeTooLong { .. }
        )
    }

    pub fn private_event_violation(&self) -> Option<&PrivateEventViolation> {
        match self {
            Failure::SingleDateRestriction(v) | Failure::MultiDayRestriction(v) => Some(v),
            _ => None,
        }
    }
}

/// Rejected rule registrations. Always reported to the registrant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("rule {0} is already registered")]
    DuplicateId(String),

    #[error("invalid rule id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },

    #[error("invalid configuration for rule {id}: {reason}")]
    InvalidConfig { id: String, reason: String },
}

impl RegistrationError {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::DuplicateId(_) => "duplicate_id",
            RegistrationError::InvalidId { .. } => "invalid_id",
            RegistrationError::InvalidConfig { .. } => "invalid_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation() -> PrivateEventViolation {
        PrivateEventViolation {
            dates: vec![NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()],
            display_dates: vec!["June 1, 2026".into()],
            selected_count: 3,
            total_count: 4,
            minimum_required: 4,
            requires_full_property: true,
        }
    }

    #[test]
    fn serialized_kind_matches_kind() {
        let f = Failure::SingleDateRestriction(violation());
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["kind"], f.kind());
        assert_eq!(v["minimum_required"], 4);
        assert_eq!(v["dates"][0], "2026-06-01");
        assert_eq!(v["requires_full_property"], true);

        let f = Failure::InvalidDate { field: "date".into(), value: "2026-02-30".into() };
        assert_eq!(serde_json::to_value(&f).unwrap()["kind"], "invalid_date");
        assert!(f.is_structural());
    }

    #[test]
    fn messages_mention_counts() {
        let msg = Failure::SingleDateRestriction(violation()).to_string();
        assert!(msg.contains("June 1, 2026"));
        assert!(msg.contains("all 4 units"));
        assert!(msg.contains("selected 3"));
    }

    #[test]
    fn registration_kinds() {
        assert_eq!(RegistrationError::DuplicateId("a".into()).kind(), "duplicate_id");
        let e = RegistrationError::InvalidId { id: "".into(), reason: "empty" };
        assert_eq!(e.kind(), "invalid_id");
    }
}
