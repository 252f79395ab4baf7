//! `SQLite` implementation of [`ExecutionLog`].

use std::collections::BTreeMap;
use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::ExecutionLog;
use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::execution::{ActionOutcome, ExecutionRecord};
use greenhub_domain::id::{ExecutionId, RuleId};

use crate::codec;
use crate::error::StorageError;

struct RecordRow(ExecutionRecord);

impl<'r> FromRow<'r, SqliteRow> for RecordRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let rule_id: String = row.try_get("rule_id")?;
        let sensor_id: String = row.try_get("sensor_id")?;
        let trigger_values: String = row.try_get("trigger_values")?;
        let triggered_at: String = row.try_get("triggered_at")?;
        let issues: String = row.try_get("issues")?;
        let duration_ms: i64 = row.try_get("duration_ms")?;

        let trigger_values: BTreeMap<String, f64> = codec::json(&trigger_values)?;
        let issues: Vec<String> = codec::json(&issues)?;

        Ok(Self(ExecutionRecord {
            id: codec::parse(&id)?,
            rule_id: codec::parse(&rule_id)?,
            rule_name: row.try_get("rule_name")?,
            sensor_id: codec::parse(&sensor_id)?,
            trigger_values,
            triggered_at: codec::parse_timestamp(&triggered_at)?,
            matched: row.try_get("matched")?,
            issues,
            error: row.try_get("error")?,
            duration_ms: codec::uint(duration_ms),
            outcomes: Vec::new(),
        }))
    }
}

struct OutcomeRow(ActionOutcome);

impl<'r> FromRow<'r, SqliteRow> for OutcomeRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let execution_id: String = row.try_get("execution_id")?;
        let action_index: i64 = row.try_get("action_index")?;
        let kind: String = row.try_get("kind")?;
        let transport: Option<String> = row.try_get("transport")?;
        let attempts: i64 = row.try_get("attempts")?;
        let latency_ms: i64 = row.try_get("latency_ms")?;
        let recorded_at: String = row.try_get("recorded_at")?;

        Ok(Self(ActionOutcome {
            execution_id: codec::parse(&execution_id)?,
            action_index: usize::try_from(action_index).map_err(codec::decode_error)?,
            kind: codec::parse(&kind)?,
            success: row.try_get("success")?,
            detail: row.try_get("detail")?,
            error: row.try_get("error")?,
            transport: transport.as_deref().map(codec::parse).transpose()?,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            latency_ms: codec::uint(latency_ms),
            recorded_at: codec::parse_timestamp(&recorded_at)?,
        }))
    }
}

const INSERT_RECORD: &str = "INSERT INTO executions (id, rule_id, rule_name, sensor_id, trigger_values, triggered_at, matched, issues, error, duration_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const INSERT_OUTCOME: &str = "INSERT INTO action_outcomes (execution_id, action_index, kind, success, detail, error, transport, attempts, latency_ms, recorded_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
const EXISTS: &str = "SELECT 1 FROM executions WHERE id = ?";
const SELECT_RECENT: &str =
    "SELECT * FROM executions ORDER BY triggered_at DESC, rowid DESC LIMIT ?";
const SELECT_BY_RULE: &str =
    "SELECT * FROM executions WHERE rule_id = ? ORDER BY triggered_at DESC, rowid DESC LIMIT ?";
const SELECT_OUTCOMES: &str =
    "SELECT * FROM action_outcomes WHERE execution_id = ? ORDER BY action_index, id";

fn sql_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

async fn insert_outcome<'e, E>(executor: E, outcome: &ActionOutcome) -> Result<(), sqlx::Error>
where
    E: sqlx::SqliteExecutor<'e>,
{
    sqlx::query(INSERT_OUTCOME)
        .bind(outcome.execution_id.to_string())
        .bind(sql_limit(outcome.action_index))
        .bind(outcome.kind.to_string())
        .bind(outcome.success)
        .bind(outcome.detail.as_deref())
        .bind(outcome.error.as_deref())
        .bind(outcome.transport.map(|t| t.as_str()))
        .bind(i64::from(outcome.attempts))
        .bind(codec::int(outcome.latency_ms))
        .bind(codec::timestamp(outcome.recorded_at))
        .execute(executor)
        .await?;
    Ok(())
}

/// `SQLite`-backed audit trail of rule evaluations.
#[derive(Clone)]
pub struct SqliteExecutionLog {
    pool: SqlitePool,
}

impl SqliteExecutionLog {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a single record with its outcomes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub async fn get(&self, id: ExecutionId) -> Result<Option<ExecutionRecord>, GreenHubError> {
        let row: Option<RecordRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        let mut records = self.with_outcomes(row.into_iter().collect()).await?;
        Ok(records.pop())
    }

    async fn with_outcomes(
        &self,
        rows: Vec<RecordRow>,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let mut records = Vec::with_capacity(rows.len());
        for RecordRow(mut record) in rows {
            let outcomes: Vec<OutcomeRow> = sqlx::query_as(SELECT_OUTCOMES)
                .bind(record.id.to_string())
                .fetch_all(&self.pool)
                .await?;
            record.outcomes = outcomes.into_iter().map(|o| o.0).collect();
            records.push(record);
        }
        Ok(records)
    }
}

impl ExecutionLog for SqliteExecutionLog {
    fn append(
        &self,
        record: ExecutionRecord,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        async move {
            let trigger_values =
                serde_json::to_string(&record.trigger_values).map_err(StorageError::from)?;
            let issues = serde_json::to_string(&record.issues).map_err(StorageError::from)?;

            let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
            sqlx::query(INSERT_RECORD)
                .bind(record.id.to_string())
                .bind(record.rule_id.to_string())
                .bind(&record.rule_name)
                .bind(record.sensor_id.to_string())
                .bind(trigger_values)
                .bind(codec::timestamp(record.triggered_at))
                .bind(record.matched)
                .bind(issues)
                .bind(record.error.as_deref())
                .bind(codec::int(record.duration_ms))
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
            for outcome in &record.outcomes {
                insert_outcome(&mut *tx, outcome)
                    .await
                    .map_err(StorageError::from)?;
            }
            tx.commit().await.map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn append_outcome(
        &self,
        outcome: ActionOutcome,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        async move {
            let exists = sqlx::query(EXISTS)
                .bind(outcome.execution_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;
            if exists.is_none() {
                return Err(NotFoundError {
                    entity: "Execution",
                    id: outcome.execution_id.to_string(),
                }
                .into());
            }
            insert_outcome(&self.pool, &outcome)
                .await
                .map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, GreenHubError>> + Send {
        async move {
            let rows: Vec<RecordRow> = sqlx::query_as(SELECT_RECENT)
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok(self.with_outcomes(rows).await?)
        }
    }

    fn find_by_rule(
        &self,
        rule_id: RuleId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, GreenHubError>> + Send {
        async move {
            let rows: Vec<RecordRow> = sqlx::query_as(SELECT_BY_RULE)
                .bind(rule_id.to_string())
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok(self.with_outcomes(rows).await?)
        }
    }
}
