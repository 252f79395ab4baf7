//! Rule evaluator — decides which rules fire for an incoming reading.
//!
//! Rules are indexed by every sensor their condition tree references, so a
//! reading only reaches the rules that read its sensor. Each rule carries an
//! explicit [`RuleState`] behind its own async mutex: checking the status,
//! evaluating the tree and entering cooldown happen as one step, so a rule
//! never fires twice inside one cooldown window even when two readings race.
//!
//! Matches are recorded in the [`ExecutionLog`] and handed to the
//! [`ActionQueue`]; the actions themselves run elsewhere.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tokio::sync::Mutex;

use greenhub_domain::error::{EvaluationError, GreenHubError, NotFoundError};
use greenhub_domain::execution::{ActionOutcome, ExecutionRecord};
use greenhub_domain::id::{ExecutionId, RuleId, SensorId};
use greenhub_domain::reading::Reading;
use greenhub_domain::rule::{Rule, RuleState, RuleStatus, SoftIssue};
use greenhub_domain::sensor::Sensor;
use greenhub_domain::time::{self, Timestamp};

use crate::action_queue::{ActionJob, ActionQueue};
use crate::ingestion::ReadingHandler;
use crate::ports::{ExecutionLog, ReadingCache, RuleRepository};

/// What happened to one rule for one reading.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationResult {
    Disabled,
    /// Still cooling down from a previous trigger.
    Suppressed { until: Option<Timestamp> },
    NotMatched { issues: Vec<SoftIssue> },
    /// The condition tree is malformed; treated as not matching.
    Invalid(EvaluationError),
    Fired { execution_id: ExecutionId },
}

/// Result of evaluating one candidate rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub rule_id: RuleId,
    pub result: EvaluationResult,
}

impl Evaluation {
    #[must_use]
    pub fn fired(&self) -> bool {
        matches!(self.result, EvaluationResult::Fired { .. })
    }
}

/// Receives rule definitions as they are saved or deleted, so evaluation
/// follows the stored rule set without a reload.
pub trait RuleSink {
    fn rule_saved(&self, rule: Rule) -> impl Future<Output = ()> + Send;
    fn rule_deleted(&self, id: RuleId) -> impl Future<Output = ()> + Send;
}

impl<T: RuleSink + Send + Sync> RuleSink for Arc<T> {
    fn rule_saved(&self, rule: Rule) -> impl Future<Output = ()> + Send {
        self.as_ref().rule_saved(rule)
    }

    fn rule_deleted(&self, id: RuleId) -> impl Future<Output = ()> + Send {
        self.as_ref().rule_deleted(id)
    }
}

#[derive(Clone)]
struct Slot {
    rule: Arc<Rule>,
    state: Arc<Mutex<RuleState>>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<RuleId, Slot>,
    by_sensor: HashMap<SensorId, Vec<RuleId>>,
}

impl Registry {
    fn insert(&mut self, slot: Slot) {
        let id = slot.rule.id;
        self.unindex(id);
        for sensor_id in slot.rule.sensor_ids() {
            self.by_sensor.entry(sensor_id).or_default().push(id);
        }
        self.slots.insert(id, slot);
    }

    fn remove(&mut self, id: RuleId) -> Option<Slot> {
        self.unindex(id);
        self.slots.remove(&id)
    }

    fn unindex(&mut self, id: RuleId) {
        let Some(previous) = self.slots.get(&id) else {
            return;
        };
        for sensor_id in previous.rule.sensor_ids() {
            if let Some(ids) = self.by_sensor.get_mut(&sensor_id) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.by_sensor.remove(&sensor_id);
                }
            }
        }
    }

    fn candidates(&self, sensor_id: SensorId) -> Vec<Slot> {
        self.by_sensor
            .get(&sensor_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.slots.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Evaluates rules against readings and owns their trigger state.
pub struct RuleEngine<C, R, L> {
    cache: C,
    rules: R,
    log: L,
    queue: Arc<ActionQueue>,
    registry: RwLock<Registry>,
    audit_all: bool,
}

impl<C, R, L> RuleEngine<C, R, L>
where
    C: ReadingCache + Send + Sync,
    R: RuleRepository + Send + Sync,
    L: ExecutionLog + Send + Sync,
{
    /// Create an engine with no rules loaded.
    pub fn new(cache: C, rules: R, log: L, queue: Arc<ActionQueue>) -> Self {
        Self {
            cache,
            rules,
            log,
            queue,
            registry: RwLock::new(Registry::default()),
            audit_all: false,
        }
    }

    /// Also record evaluations that did not match and had nothing to report.
    #[must_use]
    pub fn with_audit_all(mut self, audit_all: bool) -> Self {
        self.audit_all = audit_all;
        self
    }

    fn slot(&self, id: RuleId) -> Option<Slot> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .get(&id)
            .cloned()
    }

    /// Replace the loaded rule set.
    ///
    /// Rules already loaded keep their trigger time when it is newer than the
    /// stored one.
    pub async fn load(&self, rules: Vec<Rule>) {
        let keep: Vec<RuleId> = rules.iter().map(|r| r.id).collect();
        let stale: Vec<RuleId> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            registry
                .slots
                .keys()
                .filter(|id| !keep.contains(id))
                .copied()
                .collect()
        };
        for id in stale {
            self.remove(id);
        }
        let count = rules.len();
        for rule in rules {
            self.upsert(rule).await;
        }
        tracing::info!(rules = count, "Loaded rules");
    }

    /// Add a rule or replace its definition.
    pub async fn upsert(&self, rule: Rule) {
        let state = match self.slot(rule.id) {
            Some(existing) => {
                {
                    let mut state = existing.state.lock().await;
                    state.enabled = rule.enabled;
                    state.cooldown_secs = rule.cooldown_secs;
                    state.last_triggered = state.last_triggered.max(rule.last_triggered);
                }
                existing.state
            }
            None => Arc::new(Mutex::new(RuleState::of(&rule))),
        };
        tracing::debug!(rule_id = %rule.id, rule_name = %rule.name, "Rule registered");
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Slot {
                rule: Arc::new(rule),
                state,
            });
    }

    /// Unload a rule. Returns `false` if it was not loaded.
    pub fn remove(&self, id: RuleId) -> bool {
        let removed = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            tracing::debug!(rule_id = %id, "Rule unloaded");
        }
        removed
    }

    /// Enable or disable a loaded rule.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] if the rule is not loaded.
    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<(), GreenHubError> {
        let slot = self.slot(id).ok_or_else(|| NotFoundError {
            entity: "Rule",
            id: id.to_string(),
        })?;
        slot.state.lock().await.enabled = enabled;
        Ok(())
    }

    /// Current status of a loaded rule.
    pub async fn status(&self, id: RuleId) -> Option<RuleStatus> {
        let slot = self.slot(id)?;
        let state = slot.state.lock().await;
        Some(state.status(time::now()))
    }

    /// Number of loaded rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate every rule that references the reading's sensor.
    pub async fn evaluate(&self, sensor: &Sensor, reading: &Reading) -> Vec<Evaluation> {
        let candidates = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .candidates(reading.sensor_id);
        let mut evaluations = Vec::with_capacity(candidates.len());
        for slot in candidates {
            let result = self.evaluate_rule(&slot, sensor, reading).await;
            evaluations.push(Evaluation {
                rule_id: slot.rule.id,
                result,
            });
        }
        evaluations
    }

    async fn evaluate_rule(&self, slot: &Slot, sensor: &Sensor, reading: &Reading) -> EvaluationResult {
        let rule = &slot.rule;
        let mut state = slot.state.lock().await;
        let started = Instant::now();
        let now = time::now();

        match state.status(now) {
            RuleStatus::Disabled => return EvaluationResult::Disabled,
            RuleStatus::Cooldown => {
                let until = state.cooldown_until(now);
                tracing::debug!(rule_id = %rule.id, ?until, "Suppressed by cooldown");
                return EvaluationResult::Suppressed { until };
            }
            RuleStatus::Armed => {}
        }

        let snapshot = self.snapshot(rule, reading).await;
        let mut issues = Vec::new();
        let outcome = rule.condition.evaluate(&snapshot, &mut issues);
        for issue in &issues {
            tracing::warn!(rule_id = %rule.id, %issue, "Soft evaluation issue");
        }

        let mut record = ExecutionRecord {
            id: ExecutionId::new(),
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            sensor_id: reading.sensor_id,
            trigger_values: reading.fields.clone(),
            triggered_at: now,
            matched: false,
            issues: issues.iter().map(ToString::to_string).collect(),
            error: None,
            duration_ms: 0,
            outcomes: Vec::new(),
        };

        match outcome {
            Ok(true) => {
                state.trigger(now);
                record.matched = true;
                record.duration_ms = elapsed_ms(started);
                let execution_id = record.id;
                self.append(record).await;
                if let Err(err) = self.rules.record_trigger(rule.id, now).await {
                    tracing::warn!(rule_id = %rule.id, error = %err, "Failed to persist trigger time");
                }
                tracing::info!(
                    rule_id = %rule.id,
                    rule_name = %rule.name,
                    %execution_id,
                    sensor_id = %reading.sensor_id,
                    "Rule triggered"
                );
                let job = ActionJob {
                    execution_id,
                    rule: Arc::clone(rule),
                    sensor: sensor.clone(),
                    reading: reading.clone(),
                    triggered_at: now,
                };
                if let Some(evicted) = self.queue.push(job) {
                    self.record_dropped(&evicted).await;
                }
                EvaluationResult::Fired { execution_id }
            }
            Ok(false) => {
                if self.audit_all || !issues.is_empty() {
                    record.duration_ms = elapsed_ms(started);
                    self.append(record).await;
                }
                EvaluationResult::NotMatched { issues }
            }
            Err(err) => {
                tracing::warn!(
                    rule_id = %rule.id,
                    rule_name = %rule.name,
                    error = %err,
                    "Rule has a malformed condition tree"
                );
                record.error = Some(err.to_string());
                record.duration_ms = elapsed_ms(started);
                self.append(record).await;
                EvaluationResult::Invalid(err)
            }
        }
    }

    /// The triggering reading plus the cached readings of every other
    /// sensor the rule references.
    async fn snapshot(&self, rule: &Rule, reading: &Reading) -> HashMap<SensorId, Reading> {
        let mut snapshot = HashMap::new();
        for sensor_id in rule.sensor_ids() {
            if sensor_id == reading.sensor_id {
                continue;
            }
            if let Some(cached) = self.cache.get(sensor_id).await {
                snapshot.insert(sensor_id, cached);
            }
        }
        snapshot.insert(reading.sensor_id, reading.clone());
        snapshot
    }

    async fn append(&self, record: ExecutionRecord) {
        let execution_id = record.id;
        if let Err(err) = self.log.append(record).await {
            tracing::warn!(%execution_id, error = %err, "Failed to append execution record");
        }
    }

    async fn record_dropped(&self, job: &ActionJob) {
        tracing::warn!(
            execution_id = %job.execution_id,
            rule_id = %job.rule.id,
            capacity = self.queue.capacity(),
            "Action queue full, dropping oldest job"
        );
        for (index, action) in job.rule.actions.iter().enumerate() {
            let outcome = ActionOutcome::dropped(job.execution_id, index, action.kind());
            if let Err(err) = self.log.append_outcome(outcome).await {
                tracing::warn!(execution_id = %job.execution_id, error = %err, "Failed to record dropped action");
            }
        }
    }
}

impl<C, R, L> ReadingHandler for RuleEngine<C, R, L>
where
    C: ReadingCache + Send + Sync,
    R: RuleRepository + Send + Sync,
    L: ExecutionLog + Send + Sync,
{
    fn handle(&self, sensor: &Sensor, reading: &Reading) -> impl Future<Output = ()> + Send {
        async move {
            let evaluations = self.evaluate(sensor, reading).await;
            let fired = evaluations.iter().filter(|e| e.fired()).count();
            tracing::trace!(
                sensor_id = %reading.sensor_id,
                candidates = evaluations.len(),
                fired,
                "Reading evaluated"
            );
        }
    }
}

impl<C, R, L> RuleSink for RuleEngine<C, R, L>
where
    C: ReadingCache + Send + Sync,
    R: RuleRepository + Send + Sync,
    L: ExecutionLog + Send + Sync,
{
    fn rule_saved(&self, rule: Rule) -> impl Future<Output = ()> + Send {
        self.upsert(rule)
    }

    fn rule_deleted(&self, id: RuleId) -> impl Future<Output = ()> + Send {
        self.remove(id);
        std::future::ready(())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
