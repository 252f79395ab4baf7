//! Action executor — runs the actions of matched rules.
//!
//! Actions of a rule run in order and independently: a failing action is
//! recorded and the next one still runs. Notification actions are completed
//! with [`NotificationDefaults`] here and nowhere else, so rule authors and
//! transports always agree on what an omitted field means.

use std::sync::Arc;
use std::time::Duration;

use minijinja::{Environment, UndefinedBehavior, context};

use greenhub_domain::error::GreenHubError;
use greenhub_domain::execution::ActionOutcome;
use greenhub_domain::id::{DeviceId, NotificationId};
use greenhub_domain::notification::NotificationRequest;
use greenhub_domain::rule::{Action, ActionKind, DeviceCommand, Priority, TargetChannel};
use greenhub_domain::time;

use crate::action_queue::{ActionJob, ActionQueue};
use crate::notification::NotificationDispatcher;
use crate::ports::{DeviceCommandPublisher, DeviceRepository, ExecutionLog, NotificationTransport};

/// Why a single action failed.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("device {0} is inactive")]
    DeviceInactive(DeviceId),

    #[error("publishing to {topic} timed out")]
    PublishTimeout { topic: String },

    #[error("publishing command failed")]
    Publish(#[source] GreenHubError),

    #[error("device lookup failed")]
    Lookup(#[source] GreenHubError),

    #[error("template rendering failed: {0}")]
    Template(#[source] minijinja::Error),

    #[error("no transport selected by target {0}")]
    NoTransport(TargetChannel),
}

/// Values applied to notification fields a rule leaves unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDefaults {
    /// Logical audience, forwarded as `canal`.
    pub channel: String,
    pub target_channel: TargetChannel,
    pub priority: Priority,
    /// Recipient name, forwarded as `usuario`.
    pub user: String,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            channel: "telegram".to_string(),
            target_channel: TargetChannel::Webhook,
            priority: Priority::Normal,
            user: "greenhub".to_string(),
        }
    }
}

impl NotificationDefaults {
    /// Build a complete request from the optional fields of a notify action.
    ///
    /// A blank `channel` counts as unset.
    #[must_use]
    pub fn normalize(
        &self,
        job: &ActionJob,
        message: String,
        channel: Option<&str>,
        target_channel: Option<TargetChannel>,
        priority: Option<Priority>,
    ) -> NotificationRequest {
        let channel = channel
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.channel);
        NotificationRequest {
            id: NotificationId::new(),
            rule_id: job.rule.id,
            message,
            priority: priority.unwrap_or(self.priority),
            channel: channel.to_string(),
            target_channel: target_channel.unwrap_or(self.target_channel),
            user: self.user.clone(),
            metadata: metadata(job),
            created_at: time::now(),
        }
    }
}

fn metadata(job: &ActionJob) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    map.insert("execution_id".into(), job.execution_id.to_string().into());
    map.insert("rule_id".into(), job.rule.id.to_string().into());
    map.insert("rule_name".into(), job.rule.name.clone().into());
    map.insert("sensor_id".into(), job.sensor.id.to_string().into());
    map.insert(
        "hardware_id".into(),
        job.sensor.hardware_id.as_str().to_string().into(),
    );
    map.insert(
        "values".into(),
        serde_json::to_value(&job.reading.fields).unwrap_or_default(),
    );
    map.insert("triggered_at".into(), job.triggered_at.to_rfc3339().into());
    map
}

/// Runs actions against devices and notification transports.
pub struct ActionExecutor<D, P, T> {
    devices: D,
    publisher: P,
    dispatcher: NotificationDispatcher<T>,
    defaults: NotificationDefaults,
    publish_timeout: Duration,
    templates: Environment<'static>,
}

impl<D, P, T> ActionExecutor<D, P, T>
where
    D: DeviceRepository + Send + Sync,
    P: DeviceCommandPublisher + Send + Sync,
    T: NotificationTransport + Send + Sync,
{
    pub fn new(
        devices: D,
        publisher: P,
        dispatcher: NotificationDispatcher<T>,
        defaults: NotificationDefaults,
    ) -> Self {
        let mut templates = Environment::new();
        templates.set_undefined_behavior(UndefinedBehavior::Strict);
        Self {
            devices,
            publisher,
            dispatcher,
            defaults,
            publish_timeout: Duration::from_secs(5),
            templates,
        }
    }

    /// Deadline for publishing a device command.
    #[must_use]
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    #[must_use]
    pub fn defaults(&self) -> &NotificationDefaults {
        &self.defaults
    }

    /// Run every action of the job's rule, in order.
    ///
    /// Returns at least one outcome per action; a notification sent over
    /// several transports yields one outcome per transport.
    #[tracing::instrument(skip_all, fields(execution_id = %job.execution_id, rule_id = %job.rule.id))]
    pub async fn execute(&self, job: &ActionJob) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(job.rule.actions.len());
        for (index, action) in job.rule.actions.iter().enumerate() {
            match action {
                Action::DeviceControl { device_id, command } => {
                    let outcome = match self.control(*device_id, command).await {
                        Ok(topic) => ActionOutcome::succeeded(
                            job.execution_id,
                            index,
                            ActionKind::DeviceControl,
                            format!("published {} to {topic}", command.payload()),
                        ),
                        Err(err) => {
                            tracing::warn!(action_index = index, error = %err, "Device control failed");
                            ActionOutcome::failed(
                                job.execution_id,
                                index,
                                ActionKind::DeviceControl,
                                err.to_string(),
                            )
                        }
                    };
                    outcomes.push(outcome);
                }
                Action::Notify {
                    channel,
                    target_channel,
                    template,
                    priority,
                } => {
                    let request = self.render(template, job).map(|message| {
                        self.defaults.normalize(
                            job,
                            message,
                            channel.as_deref(),
                            *target_channel,
                            *priority,
                        )
                    });
                    match request {
                        Ok(request) => outcomes.extend(self.notify(job, index, &request).await),
                        Err(err) => {
                            tracing::warn!(action_index = index, error = %err, "Notification not sent");
                            outcomes.push(ActionOutcome::failed(
                                job.execution_id,
                                index,
                                ActionKind::Notify,
                                err.to_string(),
                            ));
                        }
                    }
                }
            }
        }
        outcomes
    }

    async fn control(&self, device_id: DeviceId, command: &DeviceCommand) -> Result<String, ActionError> {
        let device = self
            .devices
            .get_by_id(device_id)
            .await
            .map_err(ActionError::Lookup)?
            .ok_or(ActionError::DeviceNotFound(device_id))?;
        if !device.active {
            return Err(ActionError::DeviceInactive(device_id));
        }
        let topic = device.control_topic;
        tokio::time::timeout(
            self.publish_timeout,
            self.publisher.publish(topic.clone(), command.payload()),
        )
        .await
        .map_err(|_| ActionError::PublishTimeout {
            topic: topic.clone(),
        })?
        .map_err(ActionError::Publish)?;
        Ok(topic)
    }

    /// Render a notification template against the job's context.
    ///
    /// Available variables: `rule.id`, `rule.name`, `sensor.id`,
    /// `sensor.hardware_id`, `sensor.topic`, `values.<field>` and
    /// `triggered_at` (RFC 3339). Undefined variables are errors.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Template`] on syntax errors or undefined
    /// variables.
    pub fn render(&self, template: &str, job: &ActionJob) -> Result<String, ActionError> {
        let ctx = context! {
            rule => context! {
                id => job.rule.id.to_string(),
                name => job.rule.name.as_str(),
            },
            sensor => context! {
                id => job.sensor.id.to_string(),
                hardware_id => job.sensor.hardware_id.as_str(),
                topic => job.sensor.topic.as_str(),
            },
            values => &job.reading.fields,
            triggered_at => job.triggered_at.to_rfc3339(),
        };
        self.templates
            .render_str(template, ctx)
            .map_err(ActionError::Template)
    }

    async fn notify(
        &self,
        job: &ActionJob,
        index: usize,
        request: &NotificationRequest,
    ) -> Vec<ActionOutcome> {
        let deliveries = self.dispatcher.dispatch(request).await;
        if deliveries.is_empty() {
            let err = ActionError::NoTransport(request.target_channel);
            tracing::warn!(action_index = index, error = %err, "Notification not sent");
            return vec![ActionOutcome::failed(
                job.execution_id,
                index,
                ActionKind::Notify,
                err.to_string(),
            )];
        }
        deliveries
            .into_iter()
            .map(|delivery| {
                let outcome = match &delivery.error {
                    None => ActionOutcome::succeeded(
                        job.execution_id,
                        index,
                        ActionKind::Notify,
                        format!("delivered to {} via {}", request.channel, delivery.transport),
                    ),
                    Some(err) => ActionOutcome::failed(
                        job.execution_id,
                        index,
                        ActionKind::Notify,
                        err.to_string(),
                    ),
                };
                outcome.via(delivery.transport, delivery.attempts, delivery.latency_ms)
            })
            .collect()
    }
}

/// Drains the [`ActionQueue`] and records action outcomes.
pub struct ActionWorker<D, P, T, L> {
    queue: Arc<ActionQueue>,
    executor: Arc<ActionExecutor<D, P, T>>,
    log: L,
}

impl<D, P, T, L> ActionWorker<D, P, T, L>
where
    D: DeviceRepository + Send + Sync,
    P: DeviceCommandPublisher + Send + Sync,
    T: NotificationTransport + Send + Sync,
    L: ExecutionLog + Send + Sync,
{
    pub fn new(queue: Arc<ActionQueue>, executor: Arc<ActionExecutor<D, P, T>>, log: L) -> Self {
        Self {
            queue,
            executor,
            log,
        }
    }

    /// Process jobs until the queue is closed and drained.
    pub async fn run(&self) {
        tracing::debug!("Action worker started");
        while let Some(job) = self.queue.pop().await {
            self.process(&job).await;
        }
        tracing::debug!("Action worker stopped");
    }

    /// Execute one job and append its outcomes to the execution log.
    pub async fn process(&self, job: &ActionJob) {
        for outcome in self.executor.execute(job).await {
            if let Err(err) = self.log.append_outcome(outcome).await {
                tracing::warn!(execution_id = %job.execution_id, error = %err, "Failed to record action outcome");
            }
        }
    }
}
