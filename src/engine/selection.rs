use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;

use crate::model::{PrivateEventEntry, UnitId};
use crate::rules::context::ValidationContext;

use super::dates::format_display;
use super::error::PrivateEventViolation;
use super::inventory::InventoryResolver;
use super::Failure;

/// A selection is a full-property booking when it covers every unit or the
/// caller explicitly asked to book everything.
pub fn is_full_property(selected_count: usize, total_count: usize, book_all: bool) -> bool {
    book_all || selected_count >= total_count
}

/// Pure legality check for a selection against the blocking private events.
///
/// No blocking events: always legal. Otherwise only a full-property booking
/// is legal. The failure kind depends only on how many dates block.
pub fn check_selection(
    selected: &[UnitId],
    events: &BTreeMap<NaiveDate, PrivateEventEntry>,
    total_count: usize,
    book_all: bool,
) -> Result<(), Failure> {
    let dates: Vec<NaiveDate> = events
        .iter()
        .filter(|(_, e)| e.blocks_booking())
        .map(|(d, _)| *d)
        .collect();
    if dates.is_empty() {
        return Ok(());
    }
    let selected_count = selected.iter().collect::<HashSet<_>>().len();
    if is_full_property(selected_count, total_count, book_all) {
        return Ok(());
    }
    let violation = PrivateEventViolation {
        display_dates: dates.iter().map(|d| format_display(*d)).collect(),
        dates,
        selected_count,
        total_count,
        minimum_required: total_count,
        requires_full_property: true,
    };
    if violation.dates.len() == 1 {
        Err(Failure::SingleDateRestriction(violation))
    } else {
        Err(Failure::MultiDayRestriction(violation))
    }
}

/// Selection policy bound to the live inventory size.
pub struct SelectionValidator {
    inventory: Arc<InventoryResolver>,
}

impl SelectionValidator {
    pub fn new(inventory: Arc<InventoryResolver>) -> Self {
        Self { inventory }
    }

    pub async fn validate_selection(
        &self,
        selected: &[UnitId],
        events: &BTreeMap<NaiveDate, PrivateEventEntry>,
        context: &ValidationContext,
    ) -> Result<(), Failure> {
        if !events.values().any(PrivateEventEntry::blocks_booking) {
            return Ok(());
        }
        let total = self.inventory.count_units().await;
        check_selection(selected, events, total, context.book_all())
    }
}
