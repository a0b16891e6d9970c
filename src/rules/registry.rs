use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::engine::{Failure, RegistrationError};
use crate::limits::*;

use super::{Rule, RuleContext, ValidationContext};

struct RuleEntry {
    rule: Arc<dyn Rule>,
    enabled: bool,
    /// Registration order; breaks priority ties.
    seq: u64,
}

type Selection = Arc<Vec<Arc<dyn Rule>>>;

/// Older hook-style names routed to the canonical contexts.
const LEGACY_ALIASES: [(&str, RuleContext); 3] = [
    ("booking_validation_rules", RuleContext::BookingValidation),
    ("date_display_rules", RuleContext::SingleDateDisplay),
    ("date_range_validation_rules", RuleContext::DateRangeValidation),
];

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRun {
    pub payload: ValidationContext,
    pub executed: Vec<String>,
    /// Rules passed over because a dependency had not executed.
    pub skipped: Vec<String>,
}

/// Registry and executor for rules.
///
/// Execution order is priority ascending, then registration order. A rule
/// runs only if every dependency already executed in the same run; otherwise
/// it is skipped and never retried. The first `Failure` ends the run.
pub struct RuleEngine {
    rules: DashMap<String, RuleEntry>,
    next_seq: AtomicU64,
    /// `(context, data hash)` -> ordered applicable rules.
    selections: DashMap<(String, u64), Selection>,
    /// Bumped on every registry change so a selection built from the old
    /// registry is never left in the cache after the change.
    generation: AtomicU64,
    aliases: DashMap<String, RuleContext>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        let engine = Self {
            rules: DashMap::new(),
            next_seq: AtomicU64::new(0),
            selections: DashMap::new(),
            generation: AtomicU64::new(0),
            aliases: DashMap::new(),
        };
        for (alias, context) in LEGACY_ALIASES {
            engine.aliases.insert(alias.to_string(), context);
        }
        engine
    }

    // ── Registration ─────────────────────────────────────

    pub fn register(&self, rule: Arc<dyn Rule>) -> Result<(), RegistrationError> {
        let id = rule.id().to_string();
        validate_id(&id)?;
        validate_config(rule.as_ref())?;
        if self.rules.len() >= MAX_RULES {
            return Err(RegistrationError::InvalidConfig {
                id,
                reason: format!("rule limit of {MAX_RULES} reached"),
            });
        }

        match self.rules.entry(id.clone()) {
            Entry::Occupied(_) => return Err(RegistrationError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                slot.insert(RuleEntry {
                    enabled: rule.enabled_by_default(),
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    rule,
                });
            }
        }
        self.invalidate();
        info!(rule = %id, "rule registered");
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.rules.remove(id).is_some();
        if removed {
            self.invalidate();
            info!(rule = %id, "rule unregistered");
        }
        removed
    }

    /// Returns false when no such rule exists.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let Some(mut entry) = self.rules.get_mut(id) else {
            return false;
        };
        entry.enabled = enabled;
        drop(entry);
        self.invalidate();
        info!(rule = %id, enabled, "rule toggled");
        true
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.rules.get(id).is_some_and(|e| e.enabled)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Registered ids in execution order, regardless of context.
    pub fn rule_ids(&self) -> Vec<String> {
        let mut all: Vec<(i32, u64, String)> = self
            .rules
            .iter()
            .map(|e| (e.rule.priority(), e.seq, e.key().clone()))
            .collect();
        all.sort();
        all.into_iter().map(|(_, _, id)| id).collect()
    }

    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.selections.clear();
    }

    // ── Contexts ─────────────────────────────────────────

    /// Route an older hook name to a context.
    pub fn register_context_alias(&self, alias: &str, context: RuleContext) {
        self.aliases.insert(alias.to_string(), context);
        self.invalidate();
    }

    pub fn resolve_context(&self, name: &str) -> RuleContext {
        match self.aliases.get(name) {
            Some(ctx) => ctx.value().clone(),
            None => RuleContext::parse(name),
        }
    }

    /// Enabled rules applying to `context`, in execution order.
    pub fn rules_for_context(&self, context: &RuleContext, data: &ValidationContext) -> Selection {
        let key = (context.name().to_string(), data.content_hash());
        if let Some(sel) = self.selections.get(&key) {
            return sel.value().clone();
        }

        let generation = self.generation.load(Ordering::Acquire);
        // Snapshot first: `applies_to` is caller code and must not run under a shard lock.
        let mut picked: Vec<(i32, u64, Arc<dyn Rule>)> = self
            .rules
            .iter()
            .filter(|e| e.enabled)
            .map(|e| (e.rule.priority(), e.seq, e.rule.clone()))
            .collect();
        picked.retain(|(_, _, rule)| rule.applies_to(context, data));
        picked.sort_by_key(|(priority, seq, _)| (*priority, *seq));
        let sel: Selection = Arc::new(picked.into_iter().map(|(_, _, r)| r).collect());

        if self.generation.load(Ordering::Acquire) != generation {
            return sel;
        }
        if self.selections.len() >= MAX_CONTEXT_CACHE_ENTRIES {
            self.selections.clear();
        }
        self.selections.insert(key.clone(), sel.clone());
        // A change that landed between the check and the insert may have
        // cleared before this insert; take it back out.
        if self.generation.load(Ordering::Acquire) != generation {
            self.selections.remove_if(&key, |_, cached| Arc::ptr_eq(cached, &sel));
        }
        sel
    }

    // ── Execution ────────────────────────────────────────

    pub async fn apply(
        &self,
        context_name: &str,
        payload: ValidationContext,
        data: &ValidationContext,
    ) -> Result<ValidationContext, Failure> {
        self.run(context_name, payload, data).await.map(|run| run.payload)
    }

    pub async fn run(
        &self,
        context_name: &str,
        mut payload: ValidationContext,
        data: &ValidationContext,
    ) -> Result<PipelineRun, Failure> {
        let context = self.resolve_context(context_name);
        let label = context.name().to_string();
        let start = Instant::now();
        let rules = self.rules_for_context(&context, data);

        let mut executed: Vec<String> = Vec::with_capacity(rules.len());
        let mut done: HashSet<String> = HashSet::with_capacity(rules.len());
        let mut skipped = Vec::new();

        for rule in rules.iter() {
            let id = rule.id();
            if let Some(missing) = rule.dependencies().into_iter().find(|d| !done.contains(d)) {
                debug!(rule = %id, dependency = %missing, context = %label, "rule skipped: dependency not executed");
                metrics::counter!(crate::observability::RULES_SKIPPED_TOTAL, "rule" => id.to_string()).increment(1);
                skipped.push(id.to_string());
                continue;
            }

            match rule.execute(&payload).await {
                Ok(patch) => {
                    payload.merge(patch);
                    metrics::counter!(crate::observability::RULES_EXECUTED_TOTAL, "rule" => id.to_string()).increment(1);
                    done.insert(id.to_string());
                    executed.push(id.to_string());
                }
                Err(failure) => {
                    debug!(rule = %id, context = %label, kind = failure.kind(), "pipeline stopped: {failure}");
                    metrics::counter!(
                        crate::observability::PIPELINE_FAILURES_TOTAL,
                        "context" => label.clone(),
                        "kind" => failure.kind()
                    )
                    .increment(1);
                    metrics::histogram!(crate::observability::PIPELINE_DURATION_SECONDS, "context" => label)
                        .record(start.elapsed().as_secs_f64());
                    return Err(failure);
                }
            }
        }

        metrics::histogram!(crate::observability::PIPELINE_DURATION_SECONDS, "context" => label)
            .record(start.elapsed().as_secs_f64());
        Ok(PipelineRun {
            payload,
            executed,
            skipped,
        })
    }
}

fn validate_id(id: &str) -> Result<(), RegistrationError> {
    let invalid = |reason| RegistrationError::InvalidId {
        id: id.to_string(),
        reason,
    };
    if id.is_empty() {
        return Err(invalid("empty"));
    }
    if id.len() > MAX_RULE_ID_LEN {
        return Err(invalid("too long"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid("only ASCII letters, digits, '_', '-' and '.' are allowed"));
    }
    Ok(())
}

fn validate_config(rule: &dyn Rule) -> Result<(), RegistrationError> {
    let invalid = |reason: String| RegistrationError::InvalidConfig {
        id: rule.id().to_string(),
        reason,
    };
    if rule.contexts().is_empty() {
        return Err(invalid("no contexts".into()));
    }
    let priority = rule.priority();
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(invalid(format!(
            "priority {priority} outside [{MIN_PRIORITY}, {MAX_PRIORITY}]"
        )));
    }
    let deps = rule.dependencies();
    if deps.len() > MAX_RULE_DEPENDENCIES {
        return Err(invalid(format!("more than {MAX_RULE_DEPENDENCIES} dependencies")));
    }
    for dep in &deps {
        if dep == rule.id() {
            return Err(invalid("depends on itself".into()));
        }
        if validate_id(dep).is_err() {
            return Err(invalid(format!("invalid dependency id {dep:?}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::FnRule;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Mutex};

    fn ctx() -> RuleContext {
        RuleContext::BookingValidation
    }

    /// Rule that appends its id to the `trail` array.
    fn trail_rule(id: &str, priority: i32) -> FnRule {
        let name = id.to_string();
        FnRule::new(id, [ctx()], move |c| {
            let mut trail = c.get("trail").and_then(Value::as_array).cloned().unwrap_or_default();
            trail.push(json!(name));
            Ok(ValidationContext::new().with("trail", Value::Array(trail)))
        })
        .with_priority(priority)
    }

    fn trail(c: &ValidationContext) -> Vec<String> {
        c.get("trail")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn runs_in_priority_then_registration_order() {
        let engine = RuleEngine::new();
        engine.register(Arc::new(trail_rule("late", 30))).unwrap();
        engine.register(Arc::new(trail_rule("tie_a", 20))).unwrap();
        engine.register(Arc::new(trail_rule("early", 5))).unwrap();
        engine.register(Arc::new(trail_rule("tie_b", 20))).unwrap();

        let out = engine
            .apply("booking_validation", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert_eq!(trail(&out), vec!["early", "tie_a", "tie_b", "late"]);
        assert_eq!(engine.rule_ids(), vec!["early", "tie_a", "tie_b", "late"]);
    }

    #[tokio::test]
    async fn failure_stops_later_rules() {
        let engine = RuleEngine::new();
        engine.register(Arc::new(trail_rule("first", 1))).unwrap();
        engine
            .register(Arc::new(
                FnRule::new("gate", [ctx()], |_| {
                    Err(Failure::RuleFailed {
                        rule_id: "gate".into(),
                        message: "closed".into(),
                    })
                })
                .with_priority(2),
            ))
            .unwrap();
        let ran_after = Arc::new(Mutex::new(false));
        let flag = ran_after.clone();
        engine
            .register(Arc::new(
                FnRule::new("after", [ctx()], move |c| {
                    *flag.lock().unwrap() = true;
                    Ok(c.clone())
                })
                .with_priority(3),
            ))
            .unwrap();

        let err = engine
            .apply("booking_validation", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rule_failed");
        assert!(!*ran_after.lock().unwrap());
    }

    #[tokio::test]
    async fn unmet_dependency_skips_without_retry() {
        let engine = RuleEngine::new();
        // Depends on a rule that runs later: skipped, not retried.
        engine
            .register(Arc::new(trail_rule("needs_base", 1).with_dependency("base")))
            .unwrap();
        engine.register(Arc::new(trail_rule("base", 2))).unwrap();
        engine
            .register(Arc::new(trail_rule("after_base", 3).with_dependency("base")))
            .unwrap();
        engine
            .register(Arc::new(trail_rule("needs_ghost", 4).with_dependency("ghost")))
            .unwrap();

        let run = engine
            .run("booking_validation", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert_eq!(run.executed, vec!["base", "after_base"]);
        assert_eq!(run.skipped, vec!["needs_base", "needs_ghost"]);
        assert_eq!(trail(&run.payload), vec!["base", "after_base"]);
    }

    #[tokio::test]
    async fn disabled_rules_never_run() {
        let engine = RuleEngine::new();
        engine.register(Arc::new(trail_rule("off", 1).disabled())).unwrap();
        engine.register(Arc::new(trail_rule("on", 2))).unwrap();

        let run = engine
            .run("booking_validation", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert_eq!(run.executed, vec!["on"]);

        assert!(engine.set_enabled("off", true));
        let run = engine
            .run("booking_validation", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert_eq!(run.executed, vec!["off", "on"]);

        assert!(engine.set_enabled("on", false));
        assert!(!engine.is_enabled("on"));
        assert!(!engine.set_enabled("missing", true));
    }

    #[tokio::test]
    async fn rules_filtered_by_context() {
        let engine = RuleEngine::new();
        engine.register(Arc::new(trail_rule("booking", 1))).unwrap();
        engine
            .register(Arc::new(FnRule::new("display", [RuleContext::SingleDateDisplay], |c| {
                Ok(c.clone())
            })))
            .unwrap();
        let data = ValidationContext::new();
        let ids: Vec<String> = engine
            .rules_for_context(&RuleContext::SingleDateDisplay, &data)
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["display"]);
    }

    #[test]
    fn registration_errors() {
        let engine = RuleEngine::new();
        let ok = |_: &ValidationContext| -> Result<ValidationContext, Failure> { Ok(ValidationContext::new()) };

        engine.register(Arc::new(FnRule::new("a", [ctx()], ok))).unwrap();
        let err = engine.register(Arc::new(FnRule::new("a", [ctx()], ok))).unwrap_err();
        assert_eq!(err.kind(), "duplicate_id");

        for bad in ["", "has space", "ünïcode"] {
            let err = engine.register(Arc::new(FnRule::new(bad, [ctx()], ok))).unwrap_err();
            assert_eq!(err.kind(), "invalid_id", "{bad:?}");
        }
        let long = "x".repeat(MAX_RULE_ID_LEN + 1);
        assert_eq!(
            engine.register(Arc::new(FnRule::new(long, [ctx()], ok))).unwrap_err().kind(),
            "invalid_id"
        );

        let no_ctx = FnRule::new("no_ctx", Vec::<RuleContext>::new(), ok);
        assert_eq!(engine.register(Arc::new(no_ctx)).unwrap_err().kind(), "invalid_config");

        let selfish = FnRule::new("selfish", [ctx()], ok).with_dependency("selfish");
        assert_eq!(engine.register(Arc::new(selfish)).unwrap_err().kind(), "invalid_config");

        let extreme = FnRule::new("extreme", [ctx()], ok).with_priority(MAX_PRIORITY + 1);
        assert_eq!(engine.register(Arc::new(extreme)).unwrap_err().kind(), "invalid_config");

        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn register_unregister_register_again() {
        let engine = RuleEngine::new();
        let make = || Arc::new(FnRule::new("again", [ctx()], |c| Ok(c.clone())));
        engine.register(make()).unwrap();
        assert!(engine.unregister("again"));
        assert!(!engine.unregister("again"));
        engine.register(make()).unwrap();
        assert!(engine.is_registered("again"));
    }

    #[tokio::test]
    async fn selection_cache_invalidated_by_registration() {
        let engine = RuleEngine::new();
        let data = ValidationContext::new();
        engine.register(Arc::new(trail_rule("one", 1))).unwrap();
        assert_eq!(engine.rules_for_context(&ctx(), &data).len(), 1);

        engine.register(Arc::new(trail_rule("two", 2))).unwrap();
        assert_eq!(engine.rules_for_context(&ctx(), &data).len(), 2);

        engine.unregister("one");
        assert_eq!(engine.rules_for_context(&ctx(), &data).len(), 1);
    }

    /// Applies everywhere; the first `applies_to` call parks until released.
    struct ParkingRule {
        entered: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
        parked: AtomicBool,
    }

    #[async_trait::async_trait]
    impl Rule for ParkingRule {
        fn id(&self) -> &str {
            "parking"
        }

        fn contexts(&self) -> Vec<RuleContext> {
            vec![ctx()]
        }

        fn applies_to(&self, _: &RuleContext, _: &ValidationContext) -> bool {
            if !self.parked.swap(true, Ordering::SeqCst) {
                let _ = self.entered.send(());
                let _ = self.release.lock().unwrap().recv();
            }
            true
        }

        async fn execute(&self, _: &ValidationContext) -> Result<ValidationContext, Failure> {
            Ok(ValidationContext::new())
        }
    }

    #[tokio::test]
    async fn disable_during_selection_is_not_cached_stale() {
        let engine = Arc::new(RuleEngine::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        engine
            .register(Arc::new(ParkingRule {
                entered: entered_tx,
                release: Mutex::new(release_rx),
                parked: AtomicBool::new(false),
            }))
            .unwrap();
        engine.register(Arc::new(trail_rule("target", 5))).unwrap();

        let reader = {
            let engine = engine.clone();
            std::thread::spawn(move || engine.rules_for_context(&ctx(), &ValidationContext::new()).len())
        };
        entered_rx.recv().unwrap();
        assert!(engine.set_enabled("target", false));
        release_tx.send(()).unwrap();
        // The in-flight call may still answer with what it saw.
        assert_eq!(reader.join().unwrap(), 2);

        let ids: Vec<String> = engine
            .rules_for_context(&ctx(), &ValidationContext::new())
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["parking"]);

        let run = engine
            .run("booking_validation", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert_eq!(run.executed, vec!["parking"]);
    }

    #[tokio::test]
    async fn legacy_alias_reaches_context() {
        let engine = RuleEngine::new();
        engine.register(Arc::new(trail_rule("booking", 1))).unwrap();
        engine.register_context_alias("validate_booking_rules", RuleContext::BookingValidation);

        let run = engine
            .run("validate_booking_rules", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert_eq!(run.executed, vec!["booking"]);

        let run = engine
            .run("booking_validation_rules", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert_eq!(run.executed, vec!["booking"]);
        assert_eq!(engine.resolve_context("date_display_rules"), RuleContext::SingleDateDisplay);

        let run = engine
            .run("unknown_hook", ValidationContext::new(), &ValidationContext::new())
            .await
            .unwrap();
        assert!(run.executed.is_empty());
    }
}
