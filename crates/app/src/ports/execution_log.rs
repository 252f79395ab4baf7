//! Execution log port — append-only audit trail of rule evaluations.

use std::future::Future;

use greenhub_domain::error::GreenHubError;
use greenhub_domain::execution::{ActionOutcome, ExecutionRecord};
use greenhub_domain::id::RuleId;

/// Store for [`ExecutionRecord`]s and the [`ActionOutcome`]s attached to them.
pub trait ExecutionLog {
    /// Append an evaluation record.
    fn append(
        &self,
        record: ExecutionRecord,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send;

    /// Attach an action outcome to an existing record.
    fn append_outcome(
        &self,
        outcome: ActionOutcome,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send;

    /// Most recent records with their outcomes, newest first.
    fn recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, GreenHubError>> + Send;

    /// Most recent records of one rule, newest first.
    fn find_by_rule(
        &self,
        rule_id: RuleId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, GreenHubError>> + Send;
}
