//! End-to-end pipeline tests: telemetry in, device commands and notifications
//! out, against in-memory `SQLite` and fake outbound adapters.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use greenhub_adapter_storage_sqlite_sqlx::{
    Config, Database, SqliteDeviceRepository, SqliteExecutionLog, SqliteReadingRepository,
    SqliteRuleRepository, SqliteSensorRepository,
};
use greenhub_app::action_queue::ActionQueue;
use greenhub_app::cache::InMemoryReadingCache;
use greenhub_app::discovery::SensorResolver;
use greenhub_app::executor::{ActionExecutor, ActionWorker, NotificationDefaults};
use greenhub_app::ingestion::{Ingested, TelemetryIngestor};
use greenhub_app::notification::{NotificationDispatcher, RetryPolicy};
use greenhub_app::ports::{
    DeviceCommandPublisher, ExecutionLog, NotificationTransport, RuleRepository, TransportError,
};
use greenhub_app::rule_engine::RuleEngine;
use greenhub_app::services::device_service::DeviceService;
use greenhub_app::services::rule_service::RuleService;
use greenhub_app::services::sensor_service::SensorService;
use greenhub_domain::device::Device;
use greenhub_domain::error::{GreenHubError, ValidationError};
use greenhub_domain::id::DeviceId;
use greenhub_domain::notification::{NotificationRequest, TransportKind};
use greenhub_domain::rule::{
    Action, ActionKind, Condition, DeviceCommand, Operator, Priority, Rule, RuleStatus,
    TargetChannel,
};
use greenhub_domain::sensor::{FieldRange, Sensor};

const TANK_TOPIC: &str = "greenhub/sensors/tank-1/telemetry";
const DOSER_TOPIC: &str = "greenhub/devices/doser-1/set";

#[derive(Clone, Default)]
struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl DeviceCommandPublisher for RecordingPublisher {
    fn publish(
        &self,
        topic: String,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        self.published.lock().unwrap().push((topic, payload));
        async { Ok(()) }
    }
}

#[derive(Clone, Default)]
struct RecordingWebhook {
    delivered: Arc<Mutex<Vec<NotificationRequest>>>,
}

impl NotificationTransport for RecordingWebhook {
    fn available(&self) -> Vec<TransportKind> {
        vec![TransportKind::Webhook]
    }

    fn deliver(
        &self,
        kind: TransportKind,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        let result = if kind == TransportKind::Webhook {
            self.delivered.lock().unwrap().push(request.clone());
            Ok(())
        } else {
            Err(TransportError::NotConfigured(kind))
        };
        async move { result }
    }
}

type Engine = RuleEngine<Arc<InMemoryReadingCache>, SqliteRuleRepository, SqliteExecutionLog>;
type Ingestor = TelemetryIngestor<
    SqliteSensorRepository,
    SqliteReadingRepository,
    Arc<InMemoryReadingCache>,
    Arc<Engine>,
>;
type Worker =
    ActionWorker<SqliteDeviceRepository, RecordingPublisher, RecordingWebhook, SqliteExecutionLog>;

struct Harness {
    _db: Database,
    sensors: SensorService<SqliteSensorRepository>,
    devices: DeviceService<SqliteDeviceRepository>,
    rules: RuleService<
        SqliteRuleRepository,
        SqliteSensorRepository,
        SqliteDeviceRepository,
        Arc<Engine>,
    >,
    rule_repo: SqliteRuleRepository,
    log: SqliteExecutionLog,
    engine: Arc<Engine>,
    ingestor: Ingestor,
    queue: Arc<ActionQueue>,
    worker: Worker,
    publisher: RecordingPublisher,
    webhook: RecordingWebhook,
}

async fn harness() -> Harness {
    let db = Config::new("sqlite::memory:").build().await.unwrap();
    let pool = db.pool().clone();
    let sensor_repo = SqliteSensorRepository::new(pool.clone());
    let device_repo = SqliteDeviceRepository::new(pool.clone());
    let rule_repo = SqliteRuleRepository::new(pool.clone());
    let log = SqliteExecutionLog::new(pool.clone());

    let cache = Arc::new(InMemoryReadingCache::new(Duration::from_secs(300)));
    let queue = Arc::new(ActionQueue::new(16));
    let engine = Arc::new(RuleEngine::new(
        Arc::clone(&cache),
        rule_repo.clone(),
        log.clone(),
        Arc::clone(&queue),
    ));
    let resolver = SensorResolver::new(sensor_repo.clone());
    let ingestor = TelemetryIngestor::new(
        resolver.clone(),
        SqliteReadingRepository::new(pool),
        cache,
        Arc::clone(&engine),
    );

    let publisher = RecordingPublisher::default();
    let webhook = RecordingWebhook::default();
    let executor = ActionExecutor::new(
        device_repo.clone(),
        publisher.clone(),
        NotificationDispatcher::new(webhook.clone(), RetryPolicy::default()),
        NotificationDefaults::default(),
    );
    let worker = ActionWorker::new(Arc::clone(&queue), Arc::new(executor), log.clone());

    Harness {
        _db: db,
        sensors: SensorService::new(sensor_repo.clone(), resolver),
        devices: DeviceService::new(device_repo.clone()),
        rules: RuleService::new(
            rule_repo.clone(),
            sensor_repo,
            device_repo,
            Arc::clone(&engine),
        ),
        rule_repo,
        log,
        engine,
        ingestor,
        queue,
        worker,
        publisher,
        webhook,
    }
}

impl Harness {
    async fn tank_and_doser(&self) -> (Sensor, Device) {
        let tank = self
            .sensors
            .create_sensor(
                Sensor::builder()
                    .topic(TANK_TOPIC)
                    .field("ph", FieldRange::new(0.0, 14.0))
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        let doser = self
            .devices
            .create_device(
                Device::builder()
                    .hardware_id("doser-1")
                    .name("Acid doser")
                    .control_topic(DOSER_TOPIC)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        (tank, doser)
    }

    async fn ph_rule(&self, tank: &Sensor, device_id: DeviceId) -> Result<Rule, GreenHubError> {
        self.rules
            .create_rule(
                Rule::builder()
                    .name("pH too low")
                    .condition(Condition::compare(tank.id, "ph", Operator::Lt, 5.5))
                    .action(Action::DeviceControl {
                        device_id,
                        command: DeviceCommand::TurnOn,
                    })
                    .action(Action::Notify {
                        channel: None,
                        target_channel: None,
                        template: "pH {{ values.ph }} on {{ sensor.hardware_id }}".to_string(),
                        priority: Some(Priority::High),
                    })
                    .cooldown_secs(600)
                    .build()
                    .unwrap(),
            )
            .await
    }

    async fn drain_actions(&self) {
        while !self.queue.is_empty() {
            let job = self.queue.pop().await.unwrap();
            self.worker.process(&job).await;
        }
    }
}

#[tokio::test]
async fn should_run_actions_once_for_low_ph_and_suppress_repeat() {
    let h = harness().await;
    let (tank, doser) = h.tank_and_doser().await;
    let rule = h.ph_rule(&tank, doser.id).await.unwrap();

    let ingested = h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 5.2}"#).await.unwrap();
    assert!(matches!(ingested, Ingested::Accepted(_)));
    assert_eq!(h.queue.len(), 1);
    h.drain_actions().await;

    assert_eq!(
        *h.publisher.published.lock().unwrap(),
        vec![(DOSER_TOPIC.to_string(), serde_json::json!({ "state": true }))]
    );
    {
        let delivered = h.webhook.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message, "pH 5.2 on tank-1");
        assert_eq!(delivered[0].channel, "telegram");
        assert_eq!(delivered[0].target_channel, TargetChannel::Webhook);
        assert_eq!(delivered[0].priority, Priority::High);
    }

    let records = h.log.find_by_rule(rule.id, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.matched);
    assert_eq!(record.sensor_id, tank.id);
    assert_eq!(record.outcomes.len(), 2);
    assert!(record.fully_succeeded());
    assert_eq!(record.outcomes[0].kind, ActionKind::DeviceControl);
    assert_eq!(record.outcomes[1].kind, ActionKind::Notify);
    assert_eq!(record.outcomes[1].transport, Some(TransportKind::Webhook));

    // Second low reading inside the cooldown window.
    h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 5.0}"#).await.unwrap();
    assert!(h.queue.is_empty());
    assert_eq!(h.publisher.published.lock().unwrap().len(), 1);
    assert_eq!(h.log.find_by_rule(rule.id, 10).await.unwrap().len(), 1);

    let stored = h.rule_repo.get_by_id(rule.id).await.unwrap().unwrap();
    assert!(stored.last_triggered.is_some());
}

#[tokio::test]
async fn should_leave_rule_silent_for_normal_ph() {
    let h = harness().await;
    let (tank, doser) = h.tank_and_doser().await;
    let rule = h.ph_rule(&tank, doser.id).await.unwrap();

    h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 6.4}"#).await.unwrap();

    assert!(h.queue.is_empty());
    assert!(h.log.find_by_rule(rule.id, 10).await.unwrap().is_empty());
    assert!(h.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_stop_firing_once_rule_is_disabled_through_service() {
    let h = harness().await;
    let (tank, doser) = h.tank_and_doser().await;
    let rule = h.ph_rule(&tank, doser.id).await.unwrap();

    h.rules.set_enabled(rule.id, false).await.unwrap();
    h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 4.9}"#).await.unwrap();

    assert_eq!(h.engine.status(rule.id).await, Some(RuleStatus::Disabled));
    assert!(h.queue.is_empty());
    assert!(h.log.find_by_rule(rule.id, 10).await.unwrap().is_empty());

    h.rules.set_enabled(rule.id, true).await.unwrap();
    h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 4.9}"#).await.unwrap();
    assert_eq!(h.queue.len(), 1);
}

#[tokio::test]
async fn should_unload_rule_deleted_through_service() {
    let h = harness().await;
    let (tank, doser) = h.tank_and_doser().await;
    let rule = h.ph_rule(&tank, doser.id).await.unwrap();
    assert_eq!(h.engine.len(), 1);

    h.rules.delete_rule(rule.id).await.unwrap();
    h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 4.9}"#).await.unwrap();

    assert!(h.engine.is_empty());
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn should_drop_readings_once_sensor_is_deactivated_through_service() {
    let h = harness().await;
    let (tank, doser) = h.tank_and_doser().await;
    h.ph_rule(&tank, doser.id).await.unwrap();
    let first = h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 6.2}"#).await.unwrap();
    assert!(matches!(first, Ingested::Accepted(_)));

    h.sensors.set_active(tank.id, false).await.unwrap();
    let second = h.ingestor.ingest(TANK_TOPIC, br#"{"ph": 4.0}"#).await.unwrap();

    assert!(matches!(second, Ingested::Inactive(sensor) if sensor.id == tank.id));
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn should_reject_rule_for_unknown_device() {
    let h = harness().await;
    let (tank, _doser) = h.tank_and_doser().await;
    let missing = DeviceId::new();

    let err = h.ph_rule(&tank, missing).await.unwrap_err();

    assert!(matches!(
        err,
        GreenHubError::Validation(ValidationError::UnknownDevice(id)) if id == missing
    ));
    assert!(h.rule_repo.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn should_discover_unknown_sensor_and_drop_malformed_payload() {
    let h = harness().await;

    let ingested = h
        .ingestor
        .ingest("greenhub/sensors/greenhouse-3/telemetry", br#"{"temp": 21.5, "hum": 60}"#)
        .await
        .unwrap();
    let Ingested::Accepted(reading) = ingested else {
        panic!("expected the reading to be accepted");
    };
    let discovered = h.sensors.get_sensor(reading.sensor_id).await.unwrap();
    assert_eq!(discovered.hardware_id.as_str(), "greenhouse-3");
    assert!(discovered.schema.contains_key("temp"));

    let err = h
        .ingestor
        .ingest("greenhub/sensors/greenhouse-3/telemetry", b"not json")
        .await
        .unwrap_err();
    assert!(matches!(err, GreenHubError::Decode(_)));
}
