use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::model::*;
use crate::rules::context::{self, ValidationContext};
use crate::rules::{PipelineRun, RuleContext};

use super::dates::{parse_date, parse_range};
use super::inventory::ResolvedInventory;
use super::private_events::PrivateEventMap;
use super::{BookingCore, Failure};

impl BookingCore {
    // ── Inventory and counts ─────────────────────────────

    pub async fn resolve_inventory(&self) -> Arc<ResolvedInventory> {
        self.inventory.resolve().await
    }

    pub async fn counts_for_date(&self, date: &str) -> Result<UnitCounts, Failure> {
        let date = parse_date(context::DATE, date)?;
        Ok(self.counter.counts_for_date(date).await)
    }

    pub async fn counts_for_range(
        &self,
        start: &str,
        end: &str,
    ) -> Result<BTreeMap<NaiveDate, UnitCounts>, Failure> {
        let (start, end) = parse_range(start, end)?;
        self.counter.counts_for_range(start, end).await
    }

    pub async fn is_available(&self, date: &str, unit: &UnitId) -> Result<bool, Failure> {
        let date = parse_date(context::DATE, date)?;
        Ok(self.counter.is_available(date, unit).await)
    }

    /// Recognized status of one unit's cell, including non-occupying ones.
    pub async fn status_for(&self, date: &str, unit: &UnitId) -> Result<Option<CellStatus>, Failure> {
        let date = parse_date(context::DATE, date)?;
        Ok(self.counter.status_for(date, unit).await)
    }

    pub async fn available_units(&self, date: &str) -> Result<Vec<UnitId>, Failure> {
        let date = parse_date(context::DATE, date)?;
        Ok(self.counter.available_units(date).await)
    }

    pub async fn unavailable_units_by_status(
        &self,
        date: &str,
    ) -> Result<BTreeMap<CellStatus, Vec<UnitId>>, Failure> {
        let date = parse_date(context::DATE, date)?;
        Ok(self.counter.unavailable_units_by_status(date).await)
    }

    // ── Private events ───────────────────────────────────

    pub async fn private_events_in_range(&self, start: &str, end: &str) -> Result<PrivateEventMap, Failure> {
        let (start, end) = parse_range(start, end)?;
        Ok(self.private_events.private_events_in_range(start, end).await)
    }

    pub async fn is_private_event_date(&self, date: &str) -> Result<bool, Failure> {
        let date = parse_date(context::DATE, date)?;
        Ok(self.private_events.is_blocked(date).await)
    }

    // ── Validation ───────────────────────────────────────

    /// Run the booking-validation pipeline over a request carrying `date`
    /// and `selected_units` (or `book_all`).
    pub async fn validate_booking(&self, request: ValidationContext) -> Result<ValidationContext, Failure> {
        self.apply_rules(RuleContext::BookingValidation.name(), request.clone(), &request)
            .await
    }

    /// Private-event legality of a selection on one date, outside the pipeline.
    pub async fn validate_date(&self, date: &str, request: &ValidationContext) -> Result<(), Failure> {
        let date = parse_date(context::DATE, date)?;
        let selected = request.selected_units().unwrap_or_default();
        self.private_events
            .validate_single_date(date, &selected, request)
            .await
    }

    /// Run the date-range pipeline over a request carrying `start_date`,
    /// `end_date` and optionally a selection.
    pub async fn validate_date_range(&self, request: ValidationContext) -> Result<ValidationContext, Failure> {
        self.apply_rules(RuleContext::DateRangeValidation.name(), request.clone(), &request)
            .await
    }

    /// Status to show for `date`, starting from what the caller would show.
    pub async fn display_status(&self, date: &str, incoming: &str) -> Result<String, Failure> {
        let request = ValidationContext::for_date(date).with(context::DISPLAY_STATUS, incoming);
        let out = self
            .apply_rules(RuleContext::SingleDateDisplay.name(), request.clone(), &request)
            .await?;
        Ok(out.display_status().unwrap_or(incoming).to_string())
    }

    pub async fn apply_rules(
        &self,
        context_name: &str,
        payload: ValidationContext,
        data: &ValidationContext,
    ) -> Result<ValidationContext, Failure> {
        self.rules.apply(context_name, payload, data).await
    }

    /// Like `apply_rules` but reports which rules ran and which were skipped.
    pub async fn run_rules(
        &self,
        context_name: &str,
        payload: ValidationContext,
        data: &ValidationContext,
    ) -> Result<PipelineRun, Failure> {
        self.rules.run(context_name, payload, data).await
    }
}
