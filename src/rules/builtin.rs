use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::engine::availability::AvailabilityCounter;
use crate::engine::dates::parse_date;
use crate::engine::inventory::InventoryResolver;
use crate::engine::private_events::PrivateEventValidator;
use crate::engine::Failure;
use crate::model::UnitId;

use super::context::{self, ValidationContext};
use super::{Rule, RuleContext, DEFAULT_PRIORITY};

pub const PRIVATE_EVENT_RESTRICTION: &str = "private_event_restriction";
pub const PARTIAL_BOOKING_DISPLAY: &str = "partial_booking_display";
pub const MULTI_DAY_PRIVATE_VALIDATION: &str = "multi_day_private_validation";
pub const SELECTION_AVAILABILITY: &str = "selection_availability";

fn context_date(ctx: &ValidationContext) -> Result<NaiveDate, Failure> {
    parse_date(context::DATE, ctx.date().unwrap_or_default())
}

// ── Booking validation ───────────────────────────────────

/// Rejects partial selections on a private-event date.
///
/// A blocked date always gains `requires_full_property`. A failing selection
/// returns the restriction failure, whose violation carries the same flag.
pub struct PrivateEventRestrictionRule {
    validator: Arc<PrivateEventValidator>,
}

impl PrivateEventRestrictionRule {
    pub fn new(validator: Arc<PrivateEventValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Rule for PrivateEventRestrictionRule {
    fn id(&self) -> &str {
        PRIVATE_EVENT_RESTRICTION
    }

    fn contexts(&self) -> Vec<RuleContext> {
        vec![RuleContext::BookingValidation]
    }

    async fn execute(&self, ctx: &ValidationContext) -> Result<ValidationContext, Failure> {
        let date = context_date(ctx)?;
        if !self.validator.is_blocked(date).await {
            return Ok(ValidationContext::new());
        }
        if let Some(selected) = ctx.selected_units() {
            self.validator.validate_single_date(date, &selected, ctx).await?;
        }
        Ok(ValidationContext::new().with(context::REQUIRES_FULL_PROPERTY, true))
    }
}

/// Every selected unit must exist and be free on `date`. With `book_all`
/// the whole inventory is the selection.
pub struct SelectionAvailabilityRule {
    inventory: Arc<InventoryResolver>,
    counter: Arc<AvailabilityCounter>,
}

impl SelectionAvailabilityRule {
    pub fn new(inventory: Arc<InventoryResolver>, counter: Arc<AvailabilityCounter>) -> Self {
        Self { inventory, counter }
    }
}

#[async_trait]
impl Rule for SelectionAvailabilityRule {
    fn id(&self) -> &str {
        SELECTION_AVAILABILITY
    }

    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY + 10
    }

    fn contexts(&self) -> Vec<RuleContext> {
        vec![RuleContext::BookingValidation]
    }

    fn dependencies(&self) -> Vec<String> {
        vec![PRIVATE_EVENT_RESTRICTION.to_string()]
    }

    async fn execute(&self, ctx: &ValidationContext) -> Result<ValidationContext, Failure> {
        let date = context_date(ctx)?;
        let inventory = self.inventory.resolve().await;
        let selected: Vec<UnitId> = if ctx.book_all() {
            inventory.units.clone()
        } else {
            ctx.selected_units().unwrap_or_default()
        };
        if selected.is_empty() {
            return Ok(ValidationContext::new());
        }

        let mut unknown = Vec::new();
        let mut unavailable = Vec::new();
        for unit in selected {
            if !inventory.contains(&unit) {
                unknown.push(unit);
            } else if !self.counter.is_available(date, &unit).await {
                unavailable.push(unit);
            }
        }
        if unknown.is_empty() && unavailable.is_empty() {
            return Ok(ValidationContext::new());
        }

        unknown.sort();
        unknown.dedup();
        unavailable.sort();
        unavailable.dedup();
        let available_count = self.counter.counts_for_date(date).await.available as usize;
        Err(Failure::InsufficientInventory {
            date,
            unavailable,
            unknown,
            available_count,
        })
    }
}

// ── Display ──────────────────────────────────────────────

/// A fully occupied date displays as `booked` whatever the incoming status.
pub struct PartialBookingDisplayRule {
    counter: Arc<AvailabilityCounter>,
}

impl PartialBookingDisplayRule {
    pub fn new(counter: Arc<AvailabilityCounter>) -> Self {
        Self { counter }
    }
}

#[async_trait]
impl Rule for PartialBookingDisplayRule {
    fn id(&self) -> &str {
        PARTIAL_BOOKING_DISPLAY
    }

    fn contexts(&self) -> Vec<RuleContext> {
        vec![RuleContext::SingleDateDisplay]
    }

    async fn execute(&self, ctx: &ValidationContext) -> Result<ValidationContext, Failure> {
        let date = context_date(ctx)?;
        if self.counter.counts_for_date(date).await.available == 0 {
            return Ok(ValidationContext::new().with(context::DISPLAY_STATUS, "booked"));
        }
        Ok(ValidationContext::new())
    }
}

// ── Date range ───────────────────────────────────────────

pub struct MultiDayPrivateValidationRule {
    validator: Arc<PrivateEventValidator>,
}

impl MultiDayPrivateValidationRule {
    pub fn new(validator: Arc<PrivateEventValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Rule for MultiDayPrivateValidationRule {
    fn id(&self) -> &str {
        MULTI_DAY_PRIVATE_VALIDATION
    }

    fn contexts(&self) -> Vec<RuleContext> {
        vec![RuleContext::DateRangeValidation]
    }

    async fn execute(&self, ctx: &ValidationContext) -> Result<ValidationContext, Failure> {
        self.validator.validate_multi_day(ctx.clone()).await
    }
}
