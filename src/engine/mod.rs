pub mod availability;
pub mod dates;
mod error;
pub mod inventory;
mod mutations;
pub mod private_events;
mod queries;
pub mod selection;
pub mod status;

pub use error::{Failure, PrivateEventViolation, RegistrationError};

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CoreConfig;
use crate::notify::{Invalidation, InvalidationHub};
use crate::rules::builtin::*;
use crate::rules::RuleEngine;
use crate::sources::*;

use availability::AvailabilityCounter;
use inventory::InventoryResolver;
use private_events::PrivateEventValidator;
use selection::SelectionValidator;
use status::StatusCache;

/// Host-supplied data sources.
pub struct Collaborators {
    pub config: Arc<dyn ConfigStore>,
    pub status_map: Arc<dyn StatusMapSource>,
    pub directory: Arc<dyn UnitDirectory>,
    pub feed: Option<Arc<dyn PrivateEventFeed>>,
}

/// One long-lived availability core: components, their caches and the rule
/// pipeline, shared across concurrent requests.
pub struct BookingCore {
    pub settings: CoreConfig,
    pub notify: Arc<InvalidationHub>,
    pub(super) config: Arc<dyn ConfigStore>,
    pub(super) status: Arc<StatusCache>,
    pub(super) inventory: Arc<InventoryResolver>,
    pub(super) counter: Arc<AvailabilityCounter>,
    pub(super) private_events: Arc<PrivateEventValidator>,
    pub(super) rules: RuleEngine,
}

impl BookingCore {
    /// Wire the components and register the built-in rules.
    pub fn new(
        sources: Collaborators,
        settings: CoreConfig,
        notify: Arc<InvalidationHub>,
    ) -> Result<Self, RegistrationError> {
        let status = Arc::new(StatusCache::new(sources.status_map));
        let inventory = Arc::new(InventoryResolver::new(
            sources.directory,
            sources.config.clone(),
            status.clone(),
            settings.clone(),
        ));
        let counter = Arc::new(AvailabilityCounter::new(
            inventory.clone(),
            status.clone(),
            settings.segment.clone(),
        ));
        let private_events = Arc::new(PrivateEventValidator::new(
            sources.config.clone(),
            status.clone(),
            sources.feed,
            SelectionValidator::new(inventory.clone()),
            settings.clone(),
        ));

        let core = Self {
            settings,
            notify,
            config: sources.config,
            status,
            inventory,
            counter,
            private_events,
            rules: RuleEngine::new(),
        };
        core.register_builtin_rules()?;
        Ok(core)
    }

    fn register_builtin_rules(&self) -> Result<(), RegistrationError> {
        self.rules
            .register(Arc::new(PrivateEventRestrictionRule::new(self.private_events.clone())))?;
        self.rules.register(Arc::new(SelectionAvailabilityRule::new(
            self.inventory.clone(),
            self.counter.clone(),
        )))?;
        self.rules
            .register(Arc::new(PartialBookingDisplayRule::new(self.counter.clone())))?;
        self.rules
            .register(Arc::new(MultiDayPrivateValidationRule::new(self.private_events.clone())))?;
        Ok(())
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn status(&self) -> &Arc<StatusCache> {
        &self.status
    }

    pub fn inventory(&self) -> &Arc<InventoryResolver> {
        &self.inventory
    }

    pub fn counter(&self) -> &Arc<AvailabilityCounter> {
        &self.counter
    }

    pub fn private_events(&self) -> &Arc<PrivateEventValidator> {
        &self.private_events
    }

    // ── Invalidation ─────────────────────────────────────

    /// Drop every derived cache. The next read rebuilds from the sources.
    pub async fn clear_caches(&self) {
        self.status.clear_cache().await;
        self.inventory.clear_cache().await;
        self.counter.clear_cache();
        self.private_events.clear_cache().await;
        self.rules.invalidate();
        info!("all caches cleared");
    }

    pub async fn handle_invalidation(&self, event: &Invalidation) {
        debug!(?event, "invalidation received");
        match event {
            Invalidation::StatusMapChanged => {
                self.status.clear_cache().await;
                self.inventory.clear_cache().await;
                self.counter.clear_cache();
                self.private_events.clear_cache().await;
            }
            Invalidation::PrivateEventChanged { .. } => self.private_events.clear_cache().await,
            Invalidation::RulesChanged => self.rules.invalidate(),
        }
    }
}
