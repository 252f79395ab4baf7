//! # greenhub-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `greenhub-app::ports::storage`
//! - Implement the `ExecutionLog` port (evaluation records and action outcomes)
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows
//!
//! ## Dependency rule
//! Depends on `greenhub-app` (for port traits) and `greenhub-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod codec;

pub mod device_repo;
pub mod error;
pub mod execution_log;
pub mod pool;
pub mod reading_repo;
pub mod rule_repo;
pub mod sensor_repo;

pub use device_repo::SqliteDeviceRepository;
pub use error::StorageError;
pub use execution_log::SqliteExecutionLog;
pub use pool::{Config, Database};
pub use reading_repo::SqliteReadingRepository;
pub use rule_repo::SqliteRuleRepository;
pub use sensor_repo::SqliteSensorRepository;
