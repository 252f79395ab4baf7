//! `SQLite` implementation of [`SensorRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::SensorRepository;
use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::id::SensorId;
use greenhub_domain::sensor::{FieldSchema, HardwareId, Sensor};

use crate::codec;
use crate::error::StorageError;

struct Wrapper(Sensor);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Sensor> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let hardware_id: String = row.try_get("hardware_id")?;
        let schema: String = row.try_get("schema")?;
        let origin: String = row.try_get("origin")?;
        let created_at: String = row.try_get("created_at")?;

        let schema: FieldSchema = codec::json(&schema)?;

        Ok(Self(Sensor {
            id: codec::parse(&id)?,
            hardware_id: HardwareId::new(hardware_id).map_err(codec::decode_error)?,
            topic: row.try_get("topic")?,
            schema,
            active: row.try_get("active")?,
            origin: codec::parse(&origin)?,
            created_at: codec::parse_timestamp(&created_at)?,
        }))
    }
}

const INSERT: &str = "INSERT INTO sensors (id, hardware_id, topic, schema, active, origin, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)";
const INSERT_IF_ABSENT: &str = "INSERT INTO sensors (id, hardware_id, topic, schema, active, origin, created_at) VALUES (?, ?, ?, ?, ?, ?, ?) ON CONFLICT (hardware_id) DO NOTHING";
const SELECT_BY_ID: &str = "SELECT * FROM sensors WHERE id = ?";
const SELECT_BY_HARDWARE_ID: &str = "SELECT * FROM sensors WHERE hardware_id = ?";
const SELECT_ALL: &str = "SELECT * FROM sensors ORDER BY hardware_id";
const UPDATE: &str =
    "UPDATE sensors SET hardware_id = ?, topic = ?, schema = ?, active = ?, origin = ? WHERE id = ?";
const DELETE_BY_ID: &str = "DELETE FROM sensors WHERE id = ?";

fn not_found(id: SensorId) -> GreenHubError {
    NotFoundError {
        entity: "Sensor",
        id: id.to_string(),
    }
    .into()
}

/// `SQLite`-backed sensor repository.
#[derive(Clone)]
pub struct SqliteSensorRepository {
    pool: SqlitePool,
}

impl SqliteSensorRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert(&self, sql: &'static str, sensor: &Sensor) -> Result<u64, StorageError> {
        let schema = serde_json::to_string(&sensor.schema)?;
        let result = sqlx::query(sql)
            .bind(sensor.id.to_string())
            .bind(sensor.hardware_id.as_str())
            .bind(&sensor.topic)
            .bind(schema)
            .bind(sensor.active)
            .bind(sensor.origin.to_string())
            .bind(codec::timestamp(sensor.created_at))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn select_by_hardware_id(
        &self,
        hardware_id: &str,
    ) -> Result<Option<Sensor>, StorageError> {
        let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_HARDWARE_ID)
            .bind(hardware_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(Wrapper::maybe(row))
    }
}

impl SensorRepository for SqliteSensorRepository {
    fn create(&self, sensor: Sensor) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send {
        async move {
            self.insert(INSERT, &sensor).await?;
            Ok(sensor)
        }
    }

    fn insert_if_absent(
        &self,
        sensor: Sensor,
    ) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send {
        async move {
            self.insert(INSERT_IF_ABSENT, &sensor).await?;
            // The winning row, whether ours or a concurrent writer's.
            let stored = self
                .select_by_hardware_id(sensor.hardware_id.as_str())
                .await?;
            Ok(stored.unwrap_or(sensor))
        }
    }

    fn get_by_id(
        &self,
        id: SensorId,
    ) -> impl Future<Output = Result<Option<Sensor>, GreenHubError>> + Send {
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok(Wrapper::maybe(row))
        }
    }

    fn find_by_hardware_id(
        &self,
        hardware_id: &HardwareId,
    ) -> impl Future<Output = Result<Option<Sensor>, GreenHubError>> + Send {
        let hardware_id = hardware_id.as_str().to_string();
        async move { Ok(self.select_by_hardware_id(&hardware_id).await?) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Sensor>, GreenHubError>> + Send {
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }

    fn update(&self, sensor: Sensor) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send {
        async move {
            let schema = serde_json::to_string(&sensor.schema).map_err(StorageError::from)?;
            let result = sqlx::query(UPDATE)
                .bind(sensor.hardware_id.as_str())
                .bind(&sensor.topic)
                .bind(schema)
                .bind(sensor.active)
                .bind(sensor.origin.to_string())
                .bind(sensor.id.to_string())
                .execute(&self.pool)
                .await
                .map_err(StorageError::from)?;
            if result.rows_affected() == 0 {
                return Err(not_found(sensor.id));
            }
            Ok(sensor)
        }
    }

    fn delete(&self, id: SensorId) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        async move {
            let result = sqlx::query(DELETE_BY_ID)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(StorageError::from)?;
            if result.rows_affected() == 0 {
                return Err(not_found(id));
            }
            Ok(())
        }
    }
}
