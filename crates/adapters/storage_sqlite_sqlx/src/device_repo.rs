//! `SQLite` implementation of [`DeviceRepository`].

use std::future::Future;

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use greenhub_app::ports::DeviceRepository;
use greenhub_domain::device::Device;
use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::id::DeviceId;
use greenhub_domain::sensor::HardwareId;

use crate::codec;
use crate::error::StorageError;

/// Wrapper for converting database rows into domain [`Device`].
struct Wrapper(Device);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Device> {
        value.map(|w| w.0)
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let hardware_id: String = row.try_get("hardware_id")?;

        Ok(Self(Device {
            id: codec::parse(&id)?,
            hardware_id: HardwareId::new(hardware_id).map_err(codec::decode_error)?,
            name: row.try_get("name")?,
            control_topic: row.try_get("control_topic")?,
            active: row.try_get("active")?,
        }))
    }
}

const INSERT: &str =
    "INSERT INTO devices (id, hardware_id, name, control_topic, active) VALUES (?, ?, ?, ?, ?)";
const SELECT_BY_ID: &str = "SELECT * FROM devices WHERE id = ?";
const SELECT_BY_HARDWARE_ID: &str = "SELECT * FROM devices WHERE hardware_id = ?";
const SELECT_ALL: &str = "SELECT * FROM devices ORDER BY name";
const UPDATE: &str =
    "UPDATE devices SET hardware_id = ?, name = ?, control_topic = ?, active = ? WHERE id = ?";
const DELETE_BY_ID: &str = "DELETE FROM devices WHERE id = ?";

fn not_found(id: DeviceId) -> GreenHubError {
    NotFoundError {
        entity: "Device",
        id: id.to_string(),
    }
    .into()
}

/// `SQLite`-backed device repository.
#[derive(Clone)]
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    /// Create a new repository using the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DeviceRepository for SqliteDeviceRepository {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            sqlx::query(INSERT)
                .bind(device.id.to_string())
                .bind(device.hardware_id.as_str())
                .bind(&device.name)
                .bind(&device.control_topic)
                .bind(device.active)
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(device)
        }
    }

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_ID)
                .bind(id.to_string())
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }

    fn find_by_hardware_id(
        &self,
        hardware_id: &HardwareId,
    ) -> impl Future<Output = Result<Option<Device>, GreenHubError>> + Send {
        let pool = self.pool.clone();
        let hardware_id = hardware_id.as_str().to_string();
        async move {
            let row: Option<Wrapper> = sqlx::query_as(SELECT_BY_HARDWARE_ID)
                .bind(hardware_id)
                .fetch_optional(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(Wrapper::maybe(row))
        }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let rows: Vec<Wrapper> = sqlx::query_as(SELECT_ALL)
                .fetch_all(&pool)
                .await
                .map_err(StorageError::from)?;

            Ok(rows.into_iter().map(|w| w.0).collect())
        }
    }

    fn update(&self, device: Device) -> impl Future<Output = Result<Device, GreenHubError>> + Send {
        let pool = self.pool.clone();
        async move {
            let result = sqlx::query(UPDATE)
                .bind(device.hardware_id.as_str())
                .bind(&device.name)
                .bind(&device.control_topic)
                .bind(device.active)
                .bind(device.id.to_string())
                .execute(&pool)
                .await
                .map_err(StorageError::from)?;
            if result.rows_affected() == 0 {
                return Err(not_found(device.id));
            }

            Ok(device)
        }
    }

    fn delete(&self, id: DeviceId) -> impl Future<Output = Result<(), GreenHubError>> + Send {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;

    async fn setup() -> SqliteDeviceRepository {
        let db = Config::new("sqlite::memory:").build().await.unwrap();
        SqliteDeviceRepository::new(db.pool().clone())
    }

    fn pump() -> Device {
        Device::builder()
            .hardware_id("pump-1")
            .name("Dosing pump")
            .control_topic("greenhub/devices/pump-1/set")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_create_and_retrieve_device_when_valid() {
        let repo = setup().await;
        let device = pump();
        let id = device.id;

        repo.create(device).await.unwrap();

        let fetched = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.control_topic, "greenhub/devices/pump-1/set");
        assert!(fetched.active);
    }

    #[tokio::test]
    async fn should_return_none_when_device_not_found() {
        let repo = setup().await;
        let result = repo.get_by_id(DeviceId::new()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn should_find_device_by_hardware_id() {
        let repo = setup().await;
        let device = repo.create(pump()).await.unwrap();

        let found = repo
            .find_by_hardware_id(&HardwareId::new("pump-1").unwrap())
            .await
            .unwrap();

        assert_eq!(found, Some(device));
    }

    #[tokio::test]
    async fn should_update_device_when_exists() {
        let repo = setup().await;
        let mut device = repo.create(pump()).await.unwrap();

        device.active = false;
        device.name = "Nutrient pump".to_string();
        repo.update(device.clone()).await.unwrap();

        let fetched = repo.get_by_id(device.id).await.unwrap().unwrap();
        assert_eq!(fetched, device);
    }

    #[tokio::test]
    async fn should_delete_device_when_exists() {
        let repo = setup().await;
        let device = repo.create(pump()).await.unwrap();

        repo.delete(device.id).await.unwrap();

        assert!(repo.get_by_id(device.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(device.id).await,
            Err(GreenHubError::NotFound(_))
        ));
    }
}
