//! `SQLite` implementation of [`ReadingRepository`].

use std::collections::BTreeMap;
use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::ReadingRepository;
use greenhub_domain::error::GreenHubError;
use greenhub_domain::id::SensorId;
use greenhub_domain::reading::Reading;

use crate::codec;
use crate::error::StorageError;

struct Wrapper(Reading);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let sensor_id: String = row.try_get("sensor_id")?;
        let fields: String = row.try_get("fields")?;
        let received_at: String = row.try_get("received_at")?;

        let fields: BTreeMap<String, f64> = codec::json(&fields)?;

        Ok(Self(Reading {
            id: codec::parse(&id)?,
            sensor_id: codec::parse(&sensor_id)?,
            fields,
            received_at: codec::parse_timestamp(&received_at)?,
        }))
    }
}

const INSERT: &str =
    "INSERT INTO readings (id, sensor_id, fields, received_at) VALUES (?, ?, ?, ?)";
const SELECT_LATEST: &str =
    "SELECT * FROM readings WHERE sensor_id = ? ORDER BY received_at DESC, rowid DESC LIMIT ?";

/// `SQLite`-backed, append-only reading history.
#[derive(Clone)]
pub struct SqliteReadingRepository {
    pool: SqlitePool,
}

impl SqliteReadingRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl ReadingRepository for SqliteReadingRepository {
    fn insert(&self, reading: Reading) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let fields = serde_json::to_string(&reading.fields).map_err(StorageError::from)?;
            sqlx::query(INSERT)
                .bind(reading.id.to_string())
                .bind(reading.sensor_id.to_string())
                .bind(fields)
                .bind(codec::timestamp(reading.received_at))
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(())
        }
    }

    fn latest_for_sensor(
        &self,
        sensor_id: SensorId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Reading>, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_LATEST)
                .bind(sensor_id.to_string())
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;
            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }
}
