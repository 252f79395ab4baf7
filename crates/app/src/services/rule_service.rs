//! Rule service — use-cases for managing automation rules.
//!
//! Besides the domain invariants checked by [`Rule::validate`], every rule
//! saved through this service only references sensors and devices that
//! exist at save time. Deleting a sensor later does not invalidate the rule;
//! the evaluator then reports a soft issue instead.
//!
//! Every successful write is forwarded to a [`RuleSink`] (the rule engine),
//! so edits take effect on the next reading.

use greenhub_domain::error::{GreenHubError, NotFoundError, ValidationError};
use greenhub_domain::id::RuleId;
use greenhub_domain::rule::Rule;

use crate::ports::{DeviceRepository, RuleRepository, SensorRepository};
use crate::rule_engine::RuleSink;

/// Application service for rule CRUD operations.
pub struct RuleService<R, S, D, E> {
    rules: R,
    sensors: S,
    devices: D,
    engine: E,
}

impl<R, S, D, E> RuleService<R, S, D, E>
where
    R: RuleRepository,
    S: SensorRepository,
    D: DeviceRepository,
    E: RuleSink,
{
    pub fn new(rules: R, sensors: S, devices: D, engine: E) -> Self {
        Self {
            rules,
            sensors,
            devices,
            engine,
        }
    }

    /// Create a rule after validating it and the ids it references.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if invariants fail or the rule
    /// references an unknown sensor ([`ValidationError::UnknownSensor`]) or
    /// device ([`ValidationError::UnknownDevice`]), or a storage error.
    #[tracing::instrument(skip(self, rule), fields(rule_name = %rule.name))]
    pub async fn create_rule(&self, rule: Rule) -> Result<Rule, GreenHubError> {
        self.check(&rule).await?;
        let created = self.rules.create(rule).await?;
        self.engine.rule_saved(created.clone()).await;
        Ok(created)
    }

    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] when no rule with `id` exists, or
    /// a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_rule(&self, id: RuleId) -> Result<Rule, GreenHubError> {
        self.rules.get_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Rule",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_rules(&self) -> Result<Vec<Rule>, GreenHubError> {
        self.rules.get_all().await
    }

    /// Replace a rule after the same checks as [`Self::create_rule`].
    ///
    /// The stored `last_triggered` wins over the incoming one, so an edit
    /// never re-arms a rule that is cooling down.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_rule`], plus [`GreenHubError::NotFound`] if
    /// the rule does not exist.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn update_rule(&self, rule: Rule) -> Result<Rule, GreenHubError> {
        let existing = self.get_rule(rule.id).await?;
        self.check(&rule).await?;
        let last_triggered = existing.last_triggered.max(rule.last_triggered);
        let updated = self
            .rules
            .update(Rule {
                last_triggered,
                ..rule
            })
            .await?;
        self.engine.rule_saved(updated.clone()).await;
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns [`GreenHubError::NotFound`] if the rule does not exist, or a
    /// storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn set_enabled(&self, id: RuleId, enabled: bool) -> Result<Rule, GreenHubError> {
        let rule = self.get_rule(id).await?;
        let updated = self.rules.update(Rule { enabled, ..rule }).await?;
        self.engine.rule_saved(updated.clone()).await;
        tracing::info!(rule_id = %id, enabled, "Rule toggled");
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, id: RuleId) -> Result<(), GreenHubError> {
        self.rules.delete(id).await?;
        self.engine.rule_deleted(id).await;
        Ok(())
    }

    async fn check(&self, rule: &Rule) -> Result<(), GreenHubError> {
        rule.validate()?;
        for sensor_id in rule.sensor_ids() {
            if self.sensors.get_by_id(sensor_id).await?.is_none() {
                return Err(ValidationError::UnknownSensor(sensor_id).into());
            }
        }
        for device_id in rule.device_ids() {
            if self.devices.get_by_id(device_id).await?.is_none() {
                return Err(ValidationError::UnknownDevice(device_id).into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        InMemoryDeviceRepo, InMemoryRuleRepo, InMemorySensorRepo, RecordingRuleSink,
    };
    use greenhub_domain::device::Device;
    use greenhub_domain::id::{DeviceId, SensorId};
    use greenhub_domain::rule::{Action, Condition, DeviceCommand, Operator};
    use greenhub_domain::sensor::Sensor;
    use greenhub_domain::time;

    type Service =
        RuleService<InMemoryRuleRepo, InMemorySensorRepo, InMemoryDeviceRepo, RecordingRuleSink>;

    struct Fixture {
        svc: Service,
        rules: InMemoryRuleRepo,
        engine: RecordingRuleSink,
        sensor: Sensor,
        device: Device,
    }

    fn fixture() -> Fixture {
        let sensor = Sensor::builder()
            .topic("greenhub/sensors/tank-1/telemetry")
            .build()
            .unwrap();
        let device = Device::builder()
            .hardware_id("pump-1")
            .name("Dosing pump")
            .control_topic("greenhub/devices/pump-1/set")
            .build()
            .unwrap();
        let rules = InMemoryRuleRepo::default();
        let engine = RecordingRuleSink::default();
        Fixture {
            svc: RuleService::new(
                rules.clone(),
                InMemorySensorRepo::with(vec![sensor.clone()]),
                InMemoryDeviceRepo::with(vec![device.clone()]),
                engine.clone(),
            ),
            rules,
            engine,
            sensor,
            device,
        }
    }

    fn rule(sensor_id: SensorId, device_id: DeviceId) -> Rule {
        Rule::builder()
            .name("pH too low")
            .condition(Condition::compare(sensor_id, "ph", Operator::Lt, 5.5))
            .action(Action::DeviceControl {
                device_id,
                command: DeviceCommand::TurnOn,
            })
            .cooldown_secs(300)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_create_rule_with_known_references() {
        let f = fixture();
        let created = f.svc.create_rule(rule(f.sensor.id, f.device.id)).await.unwrap();

        assert_eq!(f.svc.get_rule(created.id).await.unwrap().name, "pH too low");
    }

    #[tokio::test]
    async fn should_reject_rule_with_unknown_sensor() {
        let f = fixture();
        let ghost = SensorId::new();

        let result = f.svc.create_rule(rule(ghost, f.device.id)).await;

        assert!(matches!(
            result,
            Err(GreenHubError::Validation(ValidationError::UnknownSensor(id))) if id == ghost
        ));
        assert!(f.svc.list_rules().await.unwrap().is_empty());
        assert!(f.engine.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_rule_with_unknown_device() {
        let f = fixture();
        let ghost = DeviceId::new();

        let result = f.svc.create_rule(rule(f.sensor.id, ghost)).await;

        assert!(matches!(
            result,
            Err(GreenHubError::Validation(ValidationError::UnknownDevice(id))) if id == ghost
        ));
    }

    #[tokio::test]
    async fn should_reject_update_introducing_unknown_device() {
        let f = fixture();
        let created = f.svc.create_rule(rule(f.sensor.id, f.device.id)).await.unwrap();

        let mut edited = created.clone();
        edited.actions.push(Action::DeviceControl {
            device_id: DeviceId::new(),
            command: DeviceCommand::TurnOff,
        });
        let result = f.svc.update_rule(edited).await;

        assert!(matches!(
            result,
            Err(GreenHubError::Validation(ValidationError::UnknownDevice(_)))
        ));
        assert_eq!(f.svc.get_rule(created.id).await.unwrap().actions.len(), 1);
    }

    #[tokio::test]
    async fn should_keep_stored_trigger_time_on_update() {
        let f = fixture();
        let created = f.svc.create_rule(rule(f.sensor.id, f.device.id)).await.unwrap();
        let fired_at = time::now();
        f.rules.store.lock().unwrap().get_mut(&created.id).unwrap().last_triggered = Some(fired_at);

        let mut edited = created.clone();
        edited.cooldown_secs = 60;
        let saved = f.svc.update_rule(edited).await.unwrap();

        assert_eq!(saved.last_triggered, Some(fired_at));
        assert_eq!(saved.cooldown_secs, 60);
    }

    #[tokio::test]
    async fn should_disable_rule() {
        let f = fixture();
        let created = f.svc.create_rule(rule(f.sensor.id, f.device.id)).await.unwrap();

        f.svc.set_enabled(created.id, false).await.unwrap();

        assert!(!f.svc.get_rule(created.id).await.unwrap().enabled);
        let pushed = f.engine.last_saved().unwrap();
        assert_eq!(pushed.id, created.id);
        assert!(!pushed.enabled);
    }

    #[tokio::test]
    async fn should_push_created_and_edited_rules_to_engine() {
        let f = fixture();
        let created = f.svc.create_rule(rule(f.sensor.id, f.device.id)).await.unwrap();
        assert_eq!(f.engine.last_saved(), Some(created.clone()));

        let fired_at = time::now();
        f.rules.store.lock().unwrap().get_mut(&created.id).unwrap().last_triggered = Some(fired_at);
        let mut edited = created.clone();
        edited.cooldown_secs = 30;
        f.svc.update_rule(edited).await.unwrap();

        let pushed = f.engine.last_saved().unwrap();
        assert_eq!(pushed.cooldown_secs, 30);
        assert_eq!(pushed.last_triggered, Some(fired_at));
        assert_eq!(f.engine.saved.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn should_unload_deleted_rule_only_when_it_existed() {
        let f = fixture();
        let created = f.svc.create_rule(rule(f.sensor.id, f.device.id)).await.unwrap();

        f.svc.delete_rule(created.id).await.unwrap();
        assert!(f.svc.delete_rule(created.id).await.is_err());

        assert_eq!(*f.engine.deleted.lock().unwrap(), vec![created.id]);
    }

    #[tokio::test]
    async fn should_return_not_found_when_updating_missing_rule() {
        let f = fixture();
        let result = f.svc.update_rule(rule(f.sensor.id, f.device.id)).await;
        assert!(matches!(result, Err(GreenHubError::NotFound(_))));
    }
}
