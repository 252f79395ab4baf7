//! Condition — an AND/OR tree of numeric comparisons on sensor fields.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::id::SensorId;
use crate::reading::Reading;

/// Deepest nesting accepted by [`Condition::check`] and evaluation.
pub const MAX_CONDITION_DEPTH: usize = 16;

/// Tolerance used by `==` and `!=` on floating-point values.
const EQ_TOLERANCE: f64 = 1e-9;

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    #[must_use]
    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Eq => (value - threshold).abs() <= EQ_TOLERANCE,
            Self::Ne => (value - threshold).abs() > EQ_TOLERANCE,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        })
    }
}

/// Data that was expected by a leaf but is not available.
///
/// Never an error: the leaf evaluates to `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftIssue {
    MissingSensor { sensor_id: SensorId },
    MissingField { sensor_id: SensorId, field: String },
}

impl fmt::Display for SoftIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSensor { sensor_id } => write!(f, "no reading for sensor {sensor_id}"),
            Self::MissingField { sensor_id, field } => {
                write!(f, "sensor {sensor_id} reported no field {field:?}")
            }
        }
    }
}

/// Source of the latest known field values during evaluation.
pub trait ValueSource {
    /// Look up `field` of `sensor_id`.
    ///
    /// # Errors
    ///
    /// Returns the [`SoftIssue`] describing what is missing.
    fn value(&self, sensor_id: SensorId, field: &str) -> Result<f64, SoftIssue>;
}

impl ValueSource for HashMap<SensorId, Reading> {
    fn value(&self, sensor_id: SensorId, field: &str) -> Result<f64, SoftIssue> {
        let reading = self
            .get(&sensor_id)
            .ok_or(SoftIssue::MissingSensor { sensor_id })?;
        reading.value(field).ok_or_else(|| SoftIssue::MissingField {
            sensor_id,
            field: field.to_string(),
        })
    }
}

/// Leaf: `sensor.field <operator> threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub sensor_id: SensorId,
    pub field: String,
    pub operator: Operator,
    pub threshold: f64,
}

impl Comparison {
    fn check(&self) -> Result<(), EvaluationError> {
        if self.field.trim().is_empty() {
            return Err(EvaluationError::EmptyField);
        }
        if !self.threshold.is_finite() {
            return Err(EvaluationError::InvalidThreshold {
                field: self.field.clone(),
            });
        }
        Ok(())
    }

    fn evaluate<S: ValueSource + ?Sized>(
        &self,
        source: &S,
        issues: &mut Vec<SoftIssue>,
    ) -> Result<bool, EvaluationError> {
        self.check()?;
        match source.value(self.sensor_id, &self.field) {
            Ok(value) => Ok(self.operator.apply(value, self.threshold)),
            Err(issue) => {
                issues.push(issue);
                Ok(false)
            }
        }
    }
}

/// A condition tree. The root of a rule is usually an [`Condition::All`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Logical AND; an empty group is `false`.
    All { conditions: Vec<Condition> },
    /// Logical OR; an empty group is `false`.
    Any { conditions: Vec<Condition> },
    Compare(Comparison),
}

impl Condition {
    #[must_use]
    pub fn all(conditions: Vec<Condition>) -> Self {
        Self::All { conditions }
    }

    #[must_use]
    pub fn any(conditions: Vec<Condition>) -> Self {
        Self::Any { conditions }
    }

    #[must_use]
    pub fn compare(
        sensor_id: SensorId,
        field: impl Into<String>,
        operator: Operator,
        threshold: f64,
    ) -> Self {
        Self::Compare(Comparison {
            sensor_id,
            field: field.into(),
            operator,
            threshold,
        })
    }

    /// Every sensor referenced by a leaf, without duplicates.
    #[must_use]
    pub fn sensor_ids(&self) -> Vec<SensorId> {
        let mut ids = Vec::new();
        self.collect_sensor_ids(&mut ids);
        ids
    }

    fn collect_sensor_ids(&self, ids: &mut Vec<SensorId>) {
        match self {
            Self::All { conditions } | Self::Any { conditions } => {
                for condition in conditions {
                    condition.collect_sensor_ids(ids);
                }
            }
            Self::Compare(cmp) => {
                if !ids.contains(&cmp.sensor_id) {
                    ids.push(cmp.sensor_id);
                }
            }
        }
    }

    /// Check that the tree is well formed.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] for empty field names, non-finite
    /// thresholds, or nesting deeper than [`MAX_CONDITION_DEPTH`].
    pub fn check(&self) -> Result<(), EvaluationError> {
        self.check_at(1)
    }

    fn check_at(&self, depth: usize) -> Result<(), EvaluationError> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(EvaluationError::TooDeep {
                max: MAX_CONDITION_DEPTH,
            });
        }
        match self {
            Self::All { conditions } | Self::Any { conditions } => conditions
                .iter()
                .try_for_each(|condition| condition.check_at(depth + 1)),
            Self::Compare(cmp) => cmp.check(),
        }
    }

    /// Evaluate the tree against the values in `source`.
    ///
    /// `All` stops at the first `false`, `Any` at the first `true`. Leaves
    /// whose data is missing evaluate to `false` and push a [`SoftIssue`].
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] when a visited node is malformed.
    pub fn evaluate<S: ValueSource + ?Sized>(
        &self,
        source: &S,
        issues: &mut Vec<SoftIssue>,
    ) -> Result<bool, EvaluationError> {
        self.evaluate_at(source, issues, 1)
    }

    fn evaluate_at<S: ValueSource + ?Sized>(
        &self,
        source: &S,
        issues: &mut Vec<SoftIssue>,
        depth: usize,
    ) -> Result<bool, EvaluationError> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(EvaluationError::TooDeep {
                max: MAX_CONDITION_DEPTH,
            });
        }
        match self {
            Self::All { conditions } => {
                if conditions.is_empty() {
                    return Ok(false);
                }
                for condition in conditions {
                    if !condition.evaluate_at(source, issues, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any { conditions } => {
                for condition in conditions {
                    if condition.evaluate_at(source, issues, depth + 1)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Compare(cmp) => cmp.evaluate(source, issues),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All { conditions } | Self::Any { conditions } => {
                let joiner = if matches!(self, Self::All { .. }) {
                    " AND "
                } else {
                    " OR "
                };
                f.write_str("(")?;
                for (idx, condition) in conditions.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(joiner)?;
                    }
                    write!(f, "{condition}")?;
                }
                f.write_str(")")
            }
            Self::Compare(cmp) => write!(
                f,
                "{}.{} {} {}",
                cmp.sensor_id, cmp.field, cmp.operator, cmp.threshold
            ),
        }
    }
}
