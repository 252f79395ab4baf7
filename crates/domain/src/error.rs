//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into
//! [`GreenHubError`] via `#[from]` at port boundaries.

/// Workspace-wide error returned across port boundaries.
#[derive(Debug, thiserror::Error)]
pub enum GreenHubError {
    /// A domain invariant was violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A referenced record does not exist.
    #[error("not found")]
    NotFound(#[from] NotFoundError),

    /// An inbound telemetry payload could not be decoded.
    #[error("decode error")]
    Decode(#[from] DecodeError),

    /// A condition tree could not be evaluated.
    #[error("evaluation error")]
    Evaluation(#[from] EvaluationError),

    /// The persistence collaborator failed.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An outbound transport (broker, HTTP endpoint) failed.
    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Violations of domain invariants.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("invalid hardware id {0:?}")]
    InvalidHardwareId(String),

    #[error("unknown sensor origin {0:?}")]
    InvalidOrigin(String),

    #[error("topic {0:?} does not contain a usable sensor segment")]
    InvalidTopic(String),

    #[error("control topic must not be empty")]
    EmptyControlTopic,

    #[error("field {field:?} has min greater than max")]
    InvalidRange { field: String },

    #[error("a rule needs at least one action")]
    NoActions,

    #[error("notification template must not be empty")]
    EmptyTemplate,

    #[error("malformed condition tree")]
    MalformedCondition(#[from] EvaluationError),

    #[error("rule references unknown sensor {0}")]
    UnknownSensor(crate::id::SensorId),

    #[error("rule references unknown device {0}")]
    UnknownDevice(crate::id::DeviceId),
}

/// A lookup by identifier found nothing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Reasons a telemetry payload is rejected.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON")]
    InvalidJson(#[source] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload carries no fields")]
    Empty,

    #[error("field {field:?} is not numeric")]
    NonNumeric { field: String },

    #[error("field {field:?} is not a finite number")]
    NonFinite { field: String },
}

/// A condition tree that cannot be evaluated.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum EvaluationError {
    #[error("comparison on {field:?} has a non-finite threshold")]
    InvalidThreshold { field: String },

    #[error("comparison has an empty field name")]
    EmptyField,

    #[error("condition tree is nested deeper than {max} levels")]
    TooDeep { max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_found_error_with_entity_and_id() {
        let err = NotFoundError {
            entity: "Device",
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Device abc not found");
    }

    #[test]
    fn should_convert_validation_error_into_workspace_error() {
        let err: GreenHubError = ValidationError::EmptyName.into();
        assert!(matches!(
            err,
            GreenHubError::Validation(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn should_wrap_evaluation_error_as_malformed_condition() {
        let err: ValidationError = EvaluationError::EmptyField.into();
        assert_eq!(
            err,
            ValidationError::MalformedCondition(EvaluationError::EmptyField)
        );
    }
}
