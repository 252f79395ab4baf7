//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the use-case layer and the
//! adapter layer can depend on them without creating circular dependencies.

pub mod cache;
pub mod device_control;
pub mod execution_log;
pub mod notification;
pub mod storage;

pub use cache::ReadingCache;
pub use device_control::DeviceCommandPublisher;
pub use execution_log::ExecutionLog;
pub use notification::{NotificationTransport, TransportError};
pub use storage::{DeviceRepository, ReadingRepository, RuleRepository, SensorRepository};
