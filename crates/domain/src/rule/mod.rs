//! Rule — condition → actions automation with a cooldown window.
//!
//! A [`Rule`] is evaluated whenever one of the sensors referenced by its
//! [`Condition`] tree reports. When the tree matches and the rule is
//! [`RuleStatus::Armed`], its [`Action`]s run and the rule enters
//! [`RuleStatus::Cooldown`] until `cooldown_secs` have elapsed.

mod action;
mod condition;

pub use action::{Action, ActionKind, DeviceCommand, Priority, TargetChannel};
pub use condition::{
    Comparison, Condition, MAX_CONDITION_DEPTH, Operator, SoftIssue, ValueSource,
};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GreenHubError, ValidationError};
use crate::id::{DeviceId, RuleId, SensorId};
use crate::time::Timestamp;

/// An automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    pub condition: Condition,
    pub actions: Vec<Action>,
    /// Minimum number of seconds between two triggers.
    pub cooldown_secs: u64,
    pub last_triggered: Option<Timestamp>,
}

impl Rule {
    /// Create a builder for constructing a [`Rule`].
    #[must_use]
    pub fn builder() -> RuleBuilder {
        RuleBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] when:
    /// - `name` is empty ([`ValidationError::EmptyName`])
    /// - `actions` is empty ([`ValidationError::NoActions`])
    /// - a notification has no template ([`ValidationError::EmptyTemplate`])
    /// - the condition tree is malformed ([`ValidationError::MalformedCondition`])
    pub fn validate(&self) -> Result<(), GreenHubError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.actions.is_empty() {
            return Err(ValidationError::NoActions.into());
        }
        for action in &self.actions {
            action.validate()?;
        }
        self.condition
            .check()
            .map_err(ValidationError::MalformedCondition)?;
        Ok(())
    }

    #[must_use]
    pub fn cooldown(&self) -> chrono::Duration {
        cooldown_duration(self.cooldown_secs)
    }

    /// Sensors the condition tree reads.
    #[must_use]
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        self.condition.sensor_ids()
    }

    /// Devices commanded by the actions, without duplicates.
    #[must_use]
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids = Vec::new();
        for id in self.actions.iter().filter_map(Action::device_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

fn cooldown_duration(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
    chrono::Duration::seconds(secs)
}

/// `None` when the window ends beyond the representable range.
fn cooldown_end(last: Timestamp, secs: u64) -> Option<Timestamp> {
    last.checked_add_signed(cooldown_duration(secs))
}

/// Lifecycle position of a rule at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Disabled,
    Armed,
    Cooldown,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::Armed => "armed",
            Self::Cooldown => "cooldown",
        })
    }
}

/// Mutable trigger state of a rule, separate from its definition.
///
/// The status is derived from `last_triggered` and the cooldown when asked,
/// so the cooldown → armed transition needs no timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleState {
    pub enabled: bool,
    pub last_triggered: Option<Timestamp>,
    pub cooldown_secs: u64,
}

impl RuleState {
    #[must_use]
    pub fn of(rule: &Rule) -> Self {
        Self {
            enabled: rule.enabled,
            last_triggered: rule.last_triggered,
            cooldown_secs: rule.cooldown_secs,
        }
    }

    #[must_use]
    pub fn status(&self, now: Timestamp) -> RuleStatus {
        if !self.enabled {
            return RuleStatus::Disabled;
        }
        match self.last_triggered {
            Some(last) => match cooldown_end(last, self.cooldown_secs) {
                Some(until) if now >= until => RuleStatus::Armed,
                _ => RuleStatus::Cooldown,
            },
            None => RuleStatus::Armed,
        }
    }

    /// End of the current cooldown window, if one is running at `now`.
    #[must_use]
    pub fn cooldown_until(&self, now: Timestamp) -> Option<Timestamp> {
        let until = cooldown_end(self.last_triggered?, self.cooldown_secs)?;
        (now < until).then_some(until)
    }

    /// Record a trigger at `at`; the rule enters cooldown.
    pub fn trigger(&mut self, at: Timestamp) {
        self.last_triggered = Some(at);
    }
}

/// Step-by-step builder for [`Rule`].
#[derive(Debug, Default)]
pub struct RuleBuilder {
    id: Option<RuleId>,
    name: Option<String>,
    enabled: Option<bool>,
    condition: Option<Condition>,
    actions: Vec<Action>,
    cooldown_secs: u64,
    last_triggered: Option<Timestamp>,
}

impl RuleBuilder {
    #[must_use]
    pub fn id(mut self, id: RuleId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set the root of the condition tree. Without one the rule never matches.
    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn cooldown_secs(mut self, secs: u64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    #[must_use]
    pub fn last_triggered(mut self, ts: Timestamp) -> Self {
        self.last_triggered = Some(ts);
        self
    }

    /// Consume the builder, validate, and return a [`Rule`].
    ///
    /// # Errors
    ///
    /// Returns [`GreenHubError::Validation`] if required fields are missing,
    /// empty, or the condition tree is malformed.
    pub fn build(self) -> Result<Rule, GreenHubError> {
        let rule = Rule {
            id: self.id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
            condition: self
                .condition
                .unwrap_or_else(|| Condition::all(Vec::new())),
            actions: self.actions,
            cooldown_secs: self.cooldown_secs,
            last_triggered: self.last_triggered,
        };
        rule.validate()?;
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;

    fn low_ph(sensor_id: SensorId) -> Condition {
        Condition::compare(sensor_id, "ph", Operator::Lt, 5.5)
    }

    fn valid_rule() -> Rule {
        Rule::builder()
            .name("pH too low")
            .condition(low_ph(SensorId::new()))
            .action(Action::notify("pH is {{ values.ph }}"))
            .cooldown_secs(600)
            .build()
            .unwrap()
    }

    #[test]
    fn should_build_valid_rule_when_required_fields_provided() {
        let rule = valid_rule();
        assert_eq!(rule.name, "pH too low");
        assert!(rule.enabled);
        assert_eq!(rule.cooldown(), chrono::Duration::minutes(10));
        assert!(rule.last_triggered.is_none());
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Rule::builder().action(Action::notify("x")).build();
        assert!(matches!(
            result,
            Err(GreenHubError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_return_validation_error_when_no_actions() {
        let result = Rule::builder().name("empty").build();
        assert!(matches!(
            result,
            Err(GreenHubError::Validation(ValidationError::NoActions))
        ));
    }

    #[test]
    fn should_return_validation_error_when_condition_is_malformed() {
        let result = Rule::builder()
            .name("bad")
            .condition(Condition::compare(SensorId::new(), "", Operator::Lt, 1.0))
            .action(Action::notify("x"))
            .build();
        assert!(matches!(
            result,
            Err(GreenHubError::Validation(
                ValidationError::MalformedCondition(EvaluationError::EmptyField)
            ))
        ));
    }

    #[test]
    fn should_build_rule_without_condition_that_never_matches() {
        let rule = Rule::builder()
            .name("no condition")
            .action(Action::notify("x"))
            .build()
            .unwrap();
        assert_eq!(rule.condition, Condition::all(vec![]));
        assert!(rule.sensor_ids().is_empty());
    }

    #[test]
    fn should_list_commanded_devices_once() {
        let pump = DeviceId::new();
        let rule = Rule::builder()
            .name("dose")
            .condition(low_ph(SensorId::new()))
            .action(Action::DeviceControl {
                device_id: pump,
                command: DeviceCommand::TurnOn,
            })
            .action(Action::DeviceControl {
                device_id: pump,
                command: DeviceCommand::TurnOff,
            })
            .build()
            .unwrap();
        assert_eq!(rule.device_ids(), vec![pump]);
    }

    #[test]
    fn should_be_armed_when_never_triggered() {
        let state = RuleState::of(&valid_rule());
        assert_eq!(state.status(crate::time::now()), RuleStatus::Armed);
    }

    #[test]
    fn should_be_in_cooldown_inside_window_and_armed_after() {
        let mut state = RuleState::of(&valid_rule());
        let t0 = crate::time::now();
        state.trigger(t0);
        assert_eq!(
            state.status(t0 + chrono::Duration::seconds(599)),
            RuleStatus::Cooldown
        );
        assert_eq!(
            state.status(t0 + chrono::Duration::seconds(600)),
            RuleStatus::Armed
        );
        assert_eq!(
            state.cooldown_until(t0),
            Some(t0 + chrono::Duration::seconds(600))
        );
    }

    #[test]
    fn should_report_disabled_regardless_of_cooldown() {
        let mut state = RuleState::of(&valid_rule());
        state.enabled = false;
        state.trigger(crate::time::now());
        assert_eq!(state.status(crate::time::now()), RuleStatus::Disabled);
    }

    #[test]
    fn should_round_trip_rule_through_json() {
        let rule = valid_rule();
        let json = serde_json::to_string(&rule).unwrap();
        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, back);
    }
}
