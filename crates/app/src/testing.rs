//! In-memory port fakes shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};

use greenhub_domain::device::Device;
use greenhub_domain::error::{GreenHubError, NotFoundError};
use greenhub_domain::execution::{ActionOutcome, ExecutionRecord};
use greenhub_domain::id::{DeviceId, RuleId, SensorId};
use greenhub_domain::notification::{NotificationRequest, TransportKind};
use greenhub_domain::reading::Reading;
use greenhub_domain::rule::Rule;
use greenhub_domain::sensor::{HardwareId, Sensor};
use greenhub_domain::time::Timestamp;

use crate::ports::{
    DeviceCommandPublisher, DeviceRepository, ExecutionLog, NotificationTransport,
    ReadingRepository, RuleRepository, SensorRepository, TransportError,
};
use crate::rule_engine::RuleSink;

fn not_found(entity: &'static str, id: impl ToString) -> GreenHubError {
    NotFoundError {
        entity,
        id: id.to_string(),
    }
    .into()
}

// ── Sensors ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemorySensorRepo {
    pub store: Arc<Mutex<HashMap<SensorId, Sensor>>>,
}

impl InMemorySensorRepo {
    pub fn with(sensors: Vec<Sensor>) -> Self {
        let repo = Self::default();
        repo.store
            .lock()
            .unwrap()
            .extend(sensors.into_iter().map(|s| (s.id, s)));
        repo
    }

    pub fn count(&self) -> usize {
        self.store.lock().unwrap().len()
    }
}

impl SensorRepository for InMemorySensorRepo {
    fn create(&self, sensor: Sensor) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send {
        self.store.lock().unwrap().insert(sensor.id, sensor.clone());
        async { Ok(sensor) }
    }

    fn insert_if_absent(
        &self,
        sensor: Sensor,
    ) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send {
        let mut store = self.store.lock().unwrap();
        let existing = store
            .values()
            .find(|s| s.hardware_id == sensor.hardware_id)
            .cloned();
        let stored = existing.unwrap_or_else(|| {
            store.insert(sensor.id, sensor.clone());
            sensor
        });
        async { Ok(stored) }
    }

    fn get_by_id(
        &self,
        id: SensorId,
    ) -> impl Future<Output = Result<Option<Sensor>, GreenHubError>> + Send {
        let found = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(found) }
    }

    fn find_by_hardware_id(
        &self,
        hardware_id: &HardwareId,
    ) -> impl Future<Output = Result<Option<Sensor>, GreenHubError>> + Send {
        let found = self
            .store
            .lock()
            .unwrap()
            .values()
            .find(|s| &s.hardware_id == hardware_id)
            .cloned();
        async { Ok(found) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Sensor>, GreenHubError>> + Send {
        let all: Vec<_> = self.store.lock().unwrap().values().cloned().collect();
        async { Ok(all) }
    }

    fn update(&self, sensor: Sensor) -> impl Future<Output = Result<Sensor, GreenHubError>> + Send {
        let mut store = self.store.lock().unwrap();
        let result = if store.contains_key(&sensor.id) {
            store.insert(sensor.id, sensor.clone());
            Ok(sensor)
        } else {
            Err(not_found("Sensor", sensor.id))
        };
        async { result }
    }

    fn delete(&self, id: SensorId) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let removed = self.store.lock().unwrap().remove(&id);
        let result = removed.map(|_| ()).ok_or_else(|| not_found("Sensor", id));
        async { result }
    }
}

// ── Devices ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryDeviceRepo {
    pub store: Arc<Mutex<HashMap<DeviceId, Device>>>,
}

impl InMemoryDeviceRepo {
    pub fn with(devices: Vec<Device>) -> Self {
        let repo = Self::default();
        repo.store
            .lock()
            .unwrap()
            .extend(devices.into_iter().map(|d| (d.id, d)));
        repo
    }
}

impl DeviceRepository for InMemoryDeviceRepo {
    fn create(&self, device: Device) -> impl Future<Output = Result<Device, GreenHubError>> + Send {
        self.store.lock().unwrap().insert(device.id, device.clone());
        async { Ok(device) }
    }

    fn get_by_id(
        &self,
        id: DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, GreenHubError>> + Send {
        let found = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(found) }
    }

    fn find_by_hardware_id(
        &self,
        hardware_id: &HardwareId,
    ) -> impl Future<Output = Result<Option<Device>, GreenHubError>> + Send {
        let found = self
            .store
            .lock()
            .unwrap()
            .values()
            .find(|d| &d.hardware_id == hardware_id)
            .cloned();
        async { Ok(found) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Device>, GreenHubError>> + Send {
        let all: Vec<_> = self.store.lock().unwrap().values().cloned().collect();
        async { Ok(all) }
    }

    fn update(&self, device: Device) -> impl Future<Output = Result<Device, GreenHubError>> + Send {
        let mut store = self.store.lock().unwrap();
        let result = if store.contains_key(&device.id) {
            store.insert(device.id, device.clone());
            Ok(device)
        } else {
            Err(not_found("Device", device.id))
        };
        async { result }
    }

    fn delete(&self, id: DeviceId) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let removed = self.store.lock().unwrap().remove(&id);
        let result = removed.map(|_| ()).ok_or_else(|| not_found("Device", id));
        async { result }
    }
}

// ── Readings ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryReadingRepo {
    pub readings: Arc<Mutex<Vec<Reading>>>,
    pub failing: bool,
}

impl InMemoryReadingRepo {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.readings.lock().unwrap().len()
    }
}

impl ReadingRepository for InMemoryReadingRepo {
    fn insert(&self, reading: Reading) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let result = if self.failing {
            Err(GreenHubError::Storage("disk full".into()))
        } else {
            self.readings.lock().unwrap().push(reading);
            Ok(())
        };
        async { result }
    }

    fn latest_for_sensor(
        &self,
        sensor_id: SensorId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Reading>, GreenHubError>> + Send {
        let found: Vec<_> = self
            .readings
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.sensor_id == sensor_id)
            .take(limit)
            .cloned()
            .collect();
        async { Ok(found) }
    }
}

// ── Rules ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryRuleRepo {
    pub store: Arc<Mutex<HashMap<RuleId, Rule>>>,
}

impl InMemoryRuleRepo {
    pub fn with(rules: Vec<Rule>) -> Self {
        let repo = Self::default();
        repo.store
            .lock()
            .unwrap()
            .extend(rules.into_iter().map(|r| (r.id, r)));
        repo
    }

    pub fn last_triggered(&self, id: RuleId) -> Option<Timestamp> {
        self.store
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|r| r.last_triggered)
    }
}

impl RuleRepository for InMemoryRuleRepo {
    fn create(&self, rule: Rule) -> impl Future<Output = Result<Rule, GreenHubError>> + Send {
        self.store.lock().unwrap().insert(rule.id, rule.clone());
        async { Ok(rule) }
    }

    fn get_by_id(
        &self,
        id: RuleId,
    ) -> impl Future<Output = Result<Option<Rule>, GreenHubError>> + Send {
        let found = self.store.lock().unwrap().get(&id).cloned();
        async { Ok(found) }
    }

    fn get_all(&self) -> impl Future<Output = Result<Vec<Rule>, GreenHubError>> + Send {
        let all: Vec<_> = self.store.lock().unwrap().values().cloned().collect();
        async { Ok(all) }
    }

    fn get_enabled(&self) -> impl Future<Output = Result<Vec<Rule>, GreenHubError>> + Send {
        let enabled: Vec<_> = self
            .store
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.enabled)
            .cloned()
            .collect();
        async { Ok(enabled) }
    }

    fn update(&self, rule: Rule) -> impl Future<Output = Result<Rule, GreenHubError>> + Send {
        let mut store = self.store.lock().unwrap();
        let result = if store.contains_key(&rule.id) {
            store.insert(rule.id, rule.clone());
            Ok(rule)
        } else {
            Err(not_found("Rule", rule.id))
        };
        async { result }
    }

    fn record_trigger(
        &self,
        id: RuleId,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let mut store = self.store.lock().unwrap();
        let result = match store.get_mut(&id) {
            Some(rule) => {
                rule.last_triggered = Some(at);
                Ok(())
            }
            None => Err(not_found("Rule", id)),
        };
        async { result }
    }

    fn delete(&self, id: RuleId) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let removed = self.store.lock().unwrap().remove(&id);
        let result = removed.map(|_| ()).ok_or_else(|| not_found("Rule", id));
        async { result }
    }
}

#[derive(Clone, Default)]
pub struct RecordingRuleSink {
    pub saved: Arc<Mutex<Vec<Rule>>>,
    pub deleted: Arc<Mutex<Vec<RuleId>>>,
}

impl RecordingRuleSink {
    pub fn last_saved(&self) -> Option<Rule> {
        self.saved.lock().unwrap().last().cloned()
    }
}

impl RuleSink for RecordingRuleSink {
    fn rule_saved(&self, rule: Rule) -> impl Future<Output = ()> + Send {
        self.saved.lock().unwrap().push(rule);
        async {}
    }

    fn rule_deleted(&self, id: RuleId) -> impl Future<Output = ()> + Send {
        self.deleted.lock().unwrap().push(id);
        async {}
    }
}

// ── Execution log ──────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct InMemoryExecutionLog {
    pub records: Arc<Mutex<Vec<ExecutionRecord>>>,
}

impl InMemoryExecutionLog {
    pub fn all(&self) -> Vec<ExecutionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn matched(&self) -> Vec<ExecutionRecord> {
        self.all().into_iter().filter(|r| r.matched).collect()
    }
}

impl ExecutionLog for InMemoryExecutionLog {
    fn append(
        &self,
        record: ExecutionRecord,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        self.records.lock().unwrap().push(record);
        async { Ok(()) }
    }

    fn append_outcome(
        &self,
        outcome: ActionOutcome,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let mut records = self.records.lock().unwrap();
        let result = match records.iter_mut().find(|r| r.id == outcome.execution_id) {
            Some(record) => {
                record.outcomes.push(outcome);
                Ok(())
            }
            None => Err(not_found("Execution", outcome.execution_id)),
        };
        async { result }
    }

    fn recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, GreenHubError>> + Send {
        let found: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect();
        async { Ok(found) }
    }

    fn find_by_rule(
        &self,
        rule_id: RuleId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ExecutionRecord>, GreenHubError>> + Send {
        let found: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|r| r.rule_id == rule_id)
            .take(limit)
            .cloned()
            .collect();
        async { Ok(found) }
    }
}

// ── Device commands ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub published: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    pub hang: bool,
}

impl RecordingPublisher {
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().unwrap().clone()
    }
}

impl DeviceCommandPublisher for RecordingPublisher {
    fn publish(
        &self,
        topic: String,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), GreenHubError>> + Send {
        let hang = self.hang;
        if !hang {
            self.published.lock().unwrap().push((topic, payload));
        }
        async move {
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }
}

// ── Notification transports ────────────────────────────────────────

/// Transport whose per-kind results are scripted in advance.
///
/// Once a script is exhausted, further attempts succeed.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    pub kinds: Vec<TransportKind>,
    pub script: Arc<Mutex<HashMap<TransportKind, VecDeque<Result<(), TransportError>>>>>,
    pub delivered: Arc<Mutex<Vec<(TransportKind, NotificationRequest)>>>,
    pub attempts: Arc<Mutex<HashMap<TransportKind, u32>>>,
    pub hang: bool,
}

impl ScriptedTransport {
    pub fn new(kinds: &[TransportKind]) -> Self {
        Self {
            kinds: kinds.to_vec(),
            ..Self::default()
        }
    }

    pub fn hanging(kinds: &[TransportKind]) -> Self {
        Self {
            hang: true,
            ..Self::new(kinds)
        }
    }

    pub fn script(self, kind: TransportKind, results: Vec<Result<(), TransportError>>) -> Self {
        self.script.lock().unwrap().insert(kind, results.into());
        self
    }

    pub fn delivered(&self) -> Vec<(TransportKind, NotificationRequest)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self, kind: TransportKind) -> u32 {
        self.attempts.lock().unwrap().get(&kind).copied().unwrap_or(0)
    }
}

impl NotificationTransport for ScriptedTransport {
    fn available(&self) -> Vec<TransportKind> {
        self.kinds.clone()
    }

    fn deliver(
        &self,
        kind: TransportKind,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        *self.attempts.lock().unwrap().entry(kind).or_default() += 1;
        let result = if self.kinds.contains(&kind) {
            self.script
                .lock()
                .unwrap()
                .get_mut(&kind)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(()))
        } else {
            Err(TransportError::NotConfigured(kind))
        };
        if result.is_ok() && !self.hang {
            self.delivered.lock().unwrap().push((kind, request.clone()));
        }
        let hang = self.hang;
        async move {
            if hang {
                std::future::pending::<()>().await;
            }
            result
        }
    }
}
