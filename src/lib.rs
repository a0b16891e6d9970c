//! Availability and booking-rule core for a multi-unit property: unit
//! inventory, per-date occupancy counts, private-event restrictions and a
//! prioritized rule pipeline over host-supplied data sources.

pub mod config;
pub mod engine;
pub mod limits;
pub mod listener;
pub mod model;
pub mod notify;
pub mod observability;
pub mod rules;
pub mod sources;
pub mod store;

pub use config::CoreConfig;
pub use engine::{BookingCore, Collaborators, Failure, RegistrationError};
pub use rules::{FnRule, Rule, RuleContext, RuleEngine, ValidationContext};
