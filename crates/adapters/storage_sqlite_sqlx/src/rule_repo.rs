//! `SQLite` implementation of [`RuleRepository`].
//!
//! Condition trees and actions are stored as JSON. Rows that no longer
//! decode (an unknown action tag, a corrupted tree) are skipped with a
//! warning when listing, so one bad rule never prevents the others from
//! loading.

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::RuleRepository;
use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::id::RuleId;
use greenhub_domain::rule::{Action, Condition, Rule};
use greenhub_domain::time::Timestamp;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(Rule);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let condition: String = row.try_get("condition")?;
        let actions: String = row.try_get("actions")?;
        let cooldown_secs: i64 = row.try_get("cooldown_secs")?;
        let last_triggered: Option<String> = row.try_get("last_triggered")?;

        let condition: Condition = codec::json(&condition)?;
        let actions: Vec<Action> = codec::json(&actions)?;

        Ok(Self(Rule {
            id: codec::parse(&id)?,
            name: row.try_get("name")?,
            enabled: row.try_get("enabled")?,
            condition,
            actions,
            cooldown_secs: codec::uint(cooldown_secs),
            last_triggered: last_triggered
                .as_deref()
                .map(codec::parse_timestamp)
                .transpose()?,
        }))
    }
}

const INSERT: &str = "INSERT INTO rules (id, name, enabled, condition, actions, cooldown_secs, last_triggered) VALUES (?, ?, ?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM rules WHERE id = ?";
const SELECT_ALL: &str = "SELECT * FROM rules ORDER BY name";
const SELECT_ENABLED: &str = "SELECT * FROM rules WHERE enabled = 1 ORDER BY name";
const UPDATE: &str = "UPDATE rules SET name = ?, enabled = ?, condition = ?, actions = ?, cooldown_secs = ?, last_triggered = ? WHERE id = ?";
// Never moves the trigger time backwards.
const RECORD_TRIGGER: &str = "UPDATE rules SET last_triggered = ?1 WHERE id = ?2 AND (last_triggered IS NULL OR last_triggered < ?1)";
const DELETE_BY_ID: &str = "DELETE FROM rules WHERE id = ?";

fn not_found(id: RuleId) -> GreenHubError {
    NotFoundError {
        entity: "Rule",
        id: id.to_string(),
    }
    .into()
}

struct Encoded {
    condition: String,
    actions: String,
    last_triggered: Option<String>,
}

impl Encoded {
    fn of(rule: &Rule) -> Result<Self, StorageError> {
        Ok(Self {
            condition: serde_json::to_string(&rule.condition)?,
            actions: serde_json::to_string(&rule.actions)?,
            last_triggered: rule.last_triggered.map(codec::timestamp),
        })
    }
}

/// `SQLite`-backed rule repository.
#[derive(Clone)]
pub struct SqliteRuleRepository {
    pool: SqlitePool,
}

impl SqliteRuleRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn select_many(&self, sql: &'static str) -> Result<Vec<Rule>, StorageError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let mut rules = Vec::with_capacity(rows.len());
        for row in &rows {
            match Wrapper::from_row(row) {
                Ok(wrapper) => rules.push(wrapper.0),
                Err(err) => {
                    let id: Option<String> = row.try_get("id").ok();
                    tracing::warn!(rule_id = ?id, error = %err, "Skipping undecodable rule");
                }
            }
        }
        Ok(rules)
    }
}

impl RuleRepository for SqliteRuleRepository {
    fn create(&self, rule: Rule) -> impl Future<Output = Result<Rule, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let encoded = Encoded::of(&rule)?;
            sqlx::query(INSERT)
                .bind(rule.id.to_string())
                .bind(&rule.name)
                .bind(rule.enabled)
                .bind(encoded.condition)
                .bind(encoded.actions)
                .bind(codec::int(rule.cooldown_secs))
                .bind(encoded.last_triggered)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(rule)
        }
    }

    fn get_by_id(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<Rule>, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
                .bind(id.to_string())
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(row.map(|w| w.0))
        }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Rule>, GreenHubError>> + Send {
        async move { Ok(self.select_many(SELECT_ALL).await?) }
    }

    fn get_enabled(&self) -> impl Future<Output = Result<Vec<Rule>, GreenHubError>> + Send {
        async move { Ok(self.select_many(SELECT_ENABLED).await?) }
    }

    fn update(&self, rule: Rule) -> impl Future<Output = Result<Rule, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let encoded = Encoded::of(&rule)?;
            let result = sqlx::query(UPDATE)
                .bind(&rule.name)
                .bind(rule.enabled)
                .bind(encoded.condition)
                .bind(encoded.actions)
                .bind(codec::int(rule.cooldown_secs))
                .bind(encoded.last_triggered)
                .bind(rule.id.to_string())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            if result.rows_affected() == 0 {
                return Err(not_found(rule.id));
            }
            Ok(rule)
        }
    }

    fn record_trigger(
        &self,
        id: RuleId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            sqlx::query(RECORD_TRIGGER)
                .bind(codec::timestamp(at))
                .bind(id.to_string())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn delete(&self, id: RuleId) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let result = sqlx::query(DELETE_BY_ID)
                .bind(id.to_string())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            if result.rows_affected() == 0 {
                return Err(not_found(id));
            }
            Ok(())
        }
    }
}
