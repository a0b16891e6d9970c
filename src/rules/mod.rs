pub mod builtin;
pub mod context;
mod registry;

pub use context::ValidationContext;
pub use registry::{PipelineRun, RuleEngine};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::Failure;

pub const DEFAULT_PRIORITY: i32 = 10;

/// Invocation scenario used to pick which rules run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleContext {
    SingleDateDisplay,
    BookingValidation,
    DateRangeValidation,
    Custom(String),
}

impl RuleContext {
    pub fn parse(name: &str) -> Self {
        match name {
            "single_date_display" => RuleContext::SingleDateDisplay,
            "booking_validation" => RuleContext::BookingValidation,
            "date_range_validation" => RuleContext::DateRangeValidation,
            other => RuleContext::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RuleContext::SingleDateDisplay => "single_date_display",
            RuleContext::BookingValidation => "booking_validation",
            RuleContext::DateRangeValidation => "date_range_validation",
            RuleContext::Custom(s) => s,
        }
    }
}

impl fmt::Display for RuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named step of a rule pipeline.
///
/// `execute` receives the accumulated payload and returns the keys to merge
/// into it, or a `Failure` that stops the pipeline.
#[async_trait]
pub trait Rule: Send + Sync {
    fn id(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn contexts(&self) -> Vec<RuleContext>;

    /// Rule ids that must have executed earlier in the same run.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn enabled_by_default(&self) -> bool {
        true
    }

    fn applies_to(&self, context: &RuleContext, _data: &ValidationContext) -> bool {
        self.contexts().contains(context)
    }

    async fn execute(&self, ctx: &ValidationContext) -> Result<ValidationContext, Failure>;
}

type RuleFn = dyn Fn(&ValidationContext) -> Result<ValidationContext, Failure> + Send + Sync;

/// Closure-backed rule for ad-hoc registration.
pub struct FnRule {
    id: String,
    priority: i32,
    contexts: Vec<RuleContext>,
    dependencies: Vec<String>,
    enabled: bool,
    body: Box<RuleFn>,
}

impl FnRule {
    pub fn new(
        id: impl Into<String>,
        contexts: impl IntoIterator<Item = RuleContext>,
        body: impl Fn(&ValidationContext) -> Result<ValidationContext, Failure> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            priority: DEFAULT_PRIORITY,
            contexts: contexts.into_iter().collect(),
            dependencies: Vec::new(),
            enabled: true,
            body: Box::new(body),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[async_trait]
impl Rule for FnRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn contexts(&self) -> Vec<RuleContext> {
        self.contexts.clone()
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn enabled_by_default(&self) -> bool {
        self.enabled
    }

    async fn execute(&self, ctx: &ValidationContext) -> Result<ValidationContext, Failure> {
        (self.body)(ctx)
    }
}
