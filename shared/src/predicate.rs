//! Predicate Model
//!
//! Typed boolean expression tree over ticket fields, shared by saved
//! filters, rule conditions, and escalation triggers.
//!
//! Trees are immutable once constructed and serde round-trippable (storage
//! form). Type checking happens at construction via [`Predicate::validate`]:
//! an operator applied to an incompatible field or value is rejected with
//! `TypeMismatch` before the predicate can ever reach evaluation.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::models::{Priority, TicketStatus};

/// Ticket field addressed by a comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Field {
    Status,
    Priority,
    CreatedAt,
    FirstResponseAt,
    ResolvedAt,
    Tags,
    Department,
    Assignees,
    /// Free-form custom field, compared as JSON scalar
    Custom(String),
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Custom(name) => write!(f, "custom.{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    NotEquals,
    /// Membership in a value list
    In,
    /// Set fields (tags, assignees) containing a string
    Contains,
    /// Timestamp strictly before
    Before,
    /// Timestamp strictly after
    After,
    /// Numeric / priority ordering
    GreaterThan,
    LessThan,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Comparison operand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Value {
    Status(TicketStatus),
    Priority(Priority),
    /// Unix milliseconds
    Timestamp(i64),
    Number(i64),
    Text(String),
    /// Operand for `In`
    List(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Status(_) => "status",
            Value::Priority(_) => "priority",
            Value::Timestamp(_) => "timestamp",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
        }
    }
}

/// Boolean expression over ticket fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Predicate {
    Comparison {
        field: Field,
        operator: Operator,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Build a validated comparison. The only way comparisons should be
    /// constructed outside deserialization.
    pub fn comparison(field: Field, operator: Operator, value: Value) -> CoreResult<Self> {
        let p = Predicate::Comparison {
            field,
            operator,
            value,
        };
        p.validate()?;
        Ok(p)
    }

    pub fn and(parts: Vec<Predicate>) -> Self {
        Predicate::And(parts)
    }

    pub fn or(parts: Vec<Predicate>) -> Self {
        Predicate::Or(parts)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(p: Predicate) -> Self {
        Predicate::Not(Box::new(p))
    }

    /// Type-check the whole tree.
    ///
    /// Called at authoring time (rule/filter save) and after
    /// deserialization, so evaluation itself stays total.
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Predicate::Comparison {
                field,
                operator,
                value,
            } => check_comparison(field, *operator, value),
            Predicate::And(parts) | Predicate::Or(parts) => {
                if parts.is_empty() {
                    return Err(CoreError::Validation(
                        "And/Or must have at least one operand".to_string(),
                    ));
                }
                parts.iter().try_for_each(|p| p.validate())
            }
            Predicate::Not(inner) => inner.validate(),
        }
    }
}

/// Operator/value compatibility table per field type.
fn check_comparison(field: &Field, operator: Operator, value: &Value) -> CoreResult<()> {
    use Operator::*;

    let mismatch = || CoreError::TypeMismatch {
        field: field.to_string(),
        operator: operator.to_string(),
    };

    let scalar_ok: &dyn Fn(&Value) -> bool = match field {
        Field::Status => &|v| matches!(v, Value::Status(_)),
        Field::Priority => &|v| matches!(v, Value::Priority(_)),
        Field::CreatedAt | Field::FirstResponseAt | Field::ResolvedAt => {
            &|v| matches!(v, Value::Timestamp(_))
        }
        Field::Tags | Field::Assignees | Field::Department => &|v| matches!(v, Value::Text(_)),
        Field::Custom(_) => &|v| matches!(v, Value::Text(_) | Value::Number(_)),
    };

    let operator_ok = match field {
        Field::Status => matches!(operator, Equals | NotEquals | In),
        Field::Priority => matches!(operator, Equals | NotEquals | In | GreaterThan | LessThan),
        Field::CreatedAt | Field::FirstResponseAt | Field::ResolvedAt => {
            matches!(operator, Before | After)
        }
        Field::Tags | Field::Assignees => matches!(operator, Contains),
        Field::Department => matches!(operator, Equals | NotEquals | In),
        Field::Custom(_) => matches!(operator, Equals | NotEquals | GreaterThan | LessThan),
    };
    if !operator_ok {
        return Err(mismatch());
    }

    match (operator, value) {
        // In takes a non-empty homogeneous list of field-compatible scalars
        (In, Value::List(items)) => {
            if items.is_empty() {
                return Err(CoreError::Validation(format!(
                    "In operator on {} requires a non-empty list",
                    field
                )));
            }
            if items.iter().all(scalar_ok) {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        (In, _) => Err(mismatch()),
        // Ordering on priority compares ranks, so the operand is a priority
        (GreaterThan | LessThan, v) if matches!(field, Field::Priority) => {
            if matches!(v, Value::Priority(_)) {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        (GreaterThan | LessThan, v) if matches!(field, Field::Custom(_)) => {
            if matches!(v, Value::Number(_)) {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
        (_, v) => {
            if scalar_ok(v) {
                Ok(())
            } else {
                Err(mismatch())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_equals_is_well_typed() {
        Predicate::comparison(
            Field::Status,
            Operator::Equals,
            Value::Status(TicketStatus::New),
        )
        .unwrap();
    }

    #[test]
    fn contains_on_status_is_a_type_mismatch() {
        let err = Predicate::comparison(
            Field::Status,
            Operator::Contains,
            Value::Text("x".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn timestamp_fields_only_take_before_after() {
        Predicate::comparison(Field::CreatedAt, Operator::Before, Value::Timestamp(10)).unwrap();
        let err =
            Predicate::comparison(Field::CreatedAt, Operator::Equals, Value::Timestamp(10))
                .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn in_requires_homogeneous_nonempty_list() {
        let err = Predicate::comparison(Field::Priority, Operator::In, Value::List(vec![]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = Predicate::comparison(
            Field::Priority,
            Operator::In,
            Value::List(vec![Value::Priority(Priority::High), Value::Number(3)]),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));

        Predicate::comparison(
            Field::Priority,
            Operator::In,
            Value::List(vec![
                Value::Priority(Priority::High),
                Value::Priority(Priority::Critical),
            ]),
        )
        .unwrap();
    }

    #[test]
    fn empty_and_rejected() {
        let err = Predicate::And(vec![]).validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn storage_round_trip_preserves_tree() {
        let p = Predicate::and(vec![
            Predicate::comparison(
                Field::Priority,
                Operator::GreaterThan,
                Value::Priority(Priority::Medium),
            )
            .unwrap(),
            Predicate::not(
                Predicate::comparison(
                    Field::Tags,
                    Operator::Contains,
                    Value::Text("vip".to_string()),
                )
                .unwrap(),
            ),
        ]);
        let json = serde_json::to_string(&p).unwrap();
        let back: Predicate = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
        back.validate().unwrap();
    }
}
