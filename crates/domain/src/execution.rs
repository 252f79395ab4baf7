//! Execution log records — the audit trail of rule evaluations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{ExecutionId, RuleId, SensorId};
use crate::notification::TransportKind;
use crate::rule::ActionKind;
use crate::time::Timestamp;

/// One evaluation of one rule.
///
/// `matched` is fixed when the record is appended; action outcomes are
/// attached afterwards and never change it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub rule_id: RuleId,
    pub rule_name: String,
    /// Sensor whose reading caused the evaluation.
    pub sensor_id: SensorId,
    /// Values of the triggering reading.
    pub trigger_values: BTreeMap<String, f64>,
    pub triggered_at: Timestamp,
    pub matched: bool,
    /// Missing data encountered while evaluating.
    pub issues: Vec<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub outcomes: Vec<ActionOutcome>,
}

impl ExecutionRecord {
    /// `true` when at least one action ran and every action succeeded.
    #[must_use]
    pub fn fully_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.success)
    }
}

/// Result of running one action of a matched rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub execution_id: ExecutionId,
    /// Position of the action within the rule.
    pub action_index: usize,
    pub kind: ActionKind,
    pub success: bool,
    pub detail: Option<String>,
    pub error: Option<String>,
    /// Delivery transport, for notifications.
    pub transport: Option<TransportKind>,
    pub attempts: u32,
    pub latency_ms: u64,
    pub recorded_at: Timestamp,
}

impl ActionOutcome {
    fn new(execution_id: ExecutionId, action_index: usize, kind: ActionKind, success: bool) -> Self {
        Self {
            execution_id,
            action_index,
            kind,
            success,
            detail: None,
            error: None,
            transport: None,
            attempts: 0,
            latency_ms: 0,
            recorded_at: crate::time::now(),
        }
    }

    #[must_use]
    pub fn succeeded(
        execution_id: ExecutionId,
        action_index: usize,
        kind: ActionKind,
        detail: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::new(execution_id, action_index, kind, true);
        outcome.detail = Some(detail.into());
        outcome
    }

    #[must_use]
    pub fn failed(
        execution_id: ExecutionId,
        action_index: usize,
        kind: ActionKind,
        error: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::new(execution_id, action_index, kind, false);
        outcome.error = Some(error.into());
        outcome
    }

    /// Outcome for an action whose job was evicted from a full queue.
    #[must_use]
    pub fn dropped(execution_id: ExecutionId, action_index: usize, kind: ActionKind) -> Self {
        Self::failed(execution_id, action_index, kind, "dropped: action queue full")
    }

    /// Attach delivery details.
    #[must_use]
    pub fn via(mut self, transport: TransportKind, attempts: u32, latency_ms: u64) -> Self {
        self.transport = Some(transport);
        self.attempts = attempts;
        self.latency_ms = latency_ms;
        self
    }
}
