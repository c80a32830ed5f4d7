//! Filter / Query Engine
//!
//! Evaluates a validated [`Predicate`] against a ticket. Evaluation is a
//! pure function of the ticket: no side effects, no clock reads, so
//! predicates can be shared concurrently by many rules.
//!
//! Collections are filtered in input order; filters never reorder.

use shared::models::Ticket;
use shared::predicate::{Field, Operator, Predicate, Value};

/// Evaluate a predicate against one ticket.
///
/// Total over validated predicates: comparisons that slipped past
/// validation (possible only by constructing variants by hand) evaluate to
/// false rather than panicking. And/Or short-circuit left to right.
pub fn evaluate(predicate: &Predicate, ticket: &Ticket) -> bool {
    match predicate {
        Predicate::Comparison {
            field,
            operator,
            value,
        } => compare(ticket, field, *operator, value),
        Predicate::And(parts) => parts.iter().all(|p| evaluate(p, ticket)),
        Predicate::Or(parts) => parts.iter().any(|p| evaluate(p, ticket)),
        Predicate::Not(inner) => !evaluate(inner, ticket),
    }
}

/// Filter a collection, preserving the input order.
pub fn evaluate_all<'a, I>(predicate: &Predicate, tickets: I) -> Vec<&'a Ticket>
where
    I: IntoIterator<Item = &'a Ticket>,
{
    tickets
        .into_iter()
        .filter(|t| evaluate(predicate, t))
        .collect()
}

fn compare(ticket: &Ticket, field: &Field, operator: Operator, value: &Value) -> bool {
    match field {
        Field::Status => match operator {
            Operator::Equals => matches!(value, Value::Status(s) if *s == ticket.status),
            Operator::NotEquals => matches!(value, Value::Status(s) if *s != ticket.status),
            Operator::In => in_list(value, |v| {
                matches!(v, Value::Status(s) if *s == ticket.status)
            }),
            _ => false,
        },
        Field::Priority => match operator {
            Operator::Equals => matches!(value, Value::Priority(p) if *p == ticket.priority),
            Operator::NotEquals => matches!(value, Value::Priority(p) if *p != ticket.priority),
            Operator::In => in_list(value, |v| {
                matches!(v, Value::Priority(p) if *p == ticket.priority)
            }),
            Operator::GreaterThan => {
                matches!(value, Value::Priority(p) if ticket.priority.rank() > p.rank())
            }
            Operator::LessThan => {
                matches!(value, Value::Priority(p) if ticket.priority.rank() < p.rank())
            }
            _ => false,
        },
        Field::CreatedAt => compare_timestamp(Some(ticket.created_at), operator, value),
        Field::FirstResponseAt => compare_timestamp(ticket.first_response_at, operator, value),
        Field::ResolvedAt => compare_timestamp(ticket.resolved_at, operator, value),
        Field::Tags => match (operator, value) {
            (Operator::Contains, Value::Text(tag)) => ticket.tags.contains(tag),
            _ => false,
        },
        Field::Assignees => match (operator, value) {
            (Operator::Contains, Value::Text(agent)) => ticket.assignees.contains(agent),
            _ => false,
        },
        Field::Department => match operator {
            Operator::Equals => matches!(value, Value::Text(d) if *d == ticket.department),
            Operator::NotEquals => matches!(value, Value::Text(d) if *d != ticket.department),
            Operator::In => in_list(value, |v| {
                matches!(v, Value::Text(d) if *d == ticket.department)
            }),
            _ => false,
        },
        Field::Custom(name) => compare_custom(ticket, name, operator, value),
    }
}

fn in_list(value: &Value, pred: impl Fn(&Value) -> bool) -> bool {
    matches!(value, Value::List(items) if items.iter().any(pred))
}

/// Unset (null) timestamps match nothing.
fn compare_timestamp(actual: Option<i64>, operator: Operator, value: &Value) -> bool {
    let (Some(actual), Value::Timestamp(bound)) = (actual, value) else {
        return false;
    };
    match operator {
        Operator::Before => actual < *bound,
        Operator::After => actual > *bound,
        _ => false,
    }
}

fn compare_custom(ticket: &Ticket, name: &str, operator: Operator, value: &Value) -> bool {
    let Some(actual) = ticket.custom_fields.get(name) else {
        // Missing field: only NotEquals holds
        return operator == Operator::NotEquals;
    };
    match (operator, value) {
        (Operator::Equals, Value::Text(s)) => actual.as_str() == Some(s.as_str()),
        (Operator::NotEquals, Value::Text(s)) => actual.as_str() != Some(s.as_str()),
        (Operator::Equals, Value::Number(n)) => actual.as_i64() == Some(*n),
        (Operator::NotEquals, Value::Number(n)) => actual.as_i64() != Some(*n),
        (Operator::GreaterThan, Value::Number(n)) => {
            actual.as_i64().is_some_and(|a| a > *n)
        }
        (Operator::LessThan, Value::Number(n)) => actual.as_i64().is_some_and(|a| a < *n),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Priority, TicketStatus};

    fn ticket(id: &str) -> Ticket {
        let mut t = Ticket::new(id, "support", Priority::High, 1_000);
        t.tags.insert("vip".to_string());
        t.assignees.insert("agent-7".to_string());
        t.custom_fields
            .insert("region".to_string(), serde_json::json!("emea"));
        t
    }

    fn pred(field: Field, operator: Operator, value: Value) -> Predicate {
        Predicate::comparison(field, operator, value).unwrap()
    }

    #[test]
    fn evaluation_is_deterministic_and_pure() {
        let t = ticket("tkt-1");
        let p = pred(
            Field::Priority,
            Operator::GreaterThan,
            Value::Priority(Priority::Medium),
        );
        let before = t.clone();
        for _ in 0..3 {
            assert!(evaluate(&p, &t));
        }
        assert_eq!(serde_json::to_value(&t).unwrap(), serde_json::to_value(&before).unwrap());
    }

    #[test]
    fn tag_contains() {
        let t = ticket("tkt-1");
        assert!(evaluate(
            &pred(Field::Tags, Operator::Contains, Value::Text("vip".into())),
            &t
        ));
        assert!(!evaluate(
            &pred(Field::Tags, Operator::Contains, Value::Text("spam".into())),
            &t
        ));
    }

    #[test]
    fn null_timestamps_match_nothing() {
        let t = ticket("tkt-1");
        assert_eq!(t.first_response_at, None);
        assert!(!evaluate(
            &pred(
                Field::FirstResponseAt,
                Operator::Before,
                Value::Timestamp(i64::MAX)
            ),
            &t
        ));
        assert!(!evaluate(
            &pred(
                Field::FirstResponseAt,
                Operator::After,
                Value::Timestamp(i64::MIN)
            ),
            &t
        ));
    }

    #[test]
    fn and_or_not_compose() {
        let t = ticket("tkt-1");
        let vip = pred(Field::Tags, Operator::Contains, Value::Text("vip".into()));
        let new = pred(
            Field::Status,
            Operator::Equals,
            Value::Status(TicketStatus::Resolved),
        );
        assert!(evaluate(
            &Predicate::and(vec![vip.clone(), Predicate::not(new.clone())]),
            &t
        ));
        assert!(evaluate(&Predicate::or(vec![new.clone(), vip.clone()]), &t));
        assert!(!evaluate(&Predicate::and(vec![vip, new]), &t));
    }

    #[test]
    fn evaluate_all_preserves_input_order() {
        let mut a = ticket("a");
        a.priority = Priority::Critical;
        let b = {
            let mut t = ticket("b");
            t.priority = Priority::Low;
            t
        };
        let mut c = ticket("c");
        c.priority = Priority::High;

        let tickets = vec![c.clone(), a.clone(), b.clone()];
        let p = pred(
            Field::Priority,
            Operator::GreaterThan,
            Value::Priority(Priority::Medium),
        );
        let matched: Vec<&str> = evaluate_all(&p, &tickets)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        // Input order, not priority order
        assert_eq!(matched, vec!["c", "a"]);
    }

    #[test]
    fn custom_field_comparisons() {
        let t = ticket("tkt-1");
        assert!(evaluate(
            &pred(
                Field::Custom("region".into()),
                Operator::Equals,
                Value::Text("emea".into())
            ),
            &t
        ));
        // Missing custom field only satisfies NotEquals
        assert!(evaluate(
            &pred(
                Field::Custom("tier".into()),
                Operator::NotEquals,
                Value::Text("gold".into())
            ),
            &t
        ));
        assert!(!evaluate(
            &pred(
                Field::Custom("tier".into()),
                Operator::Equals,
                Value::Text("gold".into())
            ),
            &t
        ));
    }

    #[test]
    fn status_in_list() {
        let t = ticket("tkt-1");
        let p = pred(
            Field::Status,
            Operator::In,
            Value::List(vec![
                Value::Status(TicketStatus::New),
                Value::Status(TicketStatus::Waiting),
            ]),
        );
        assert!(evaluate(&p, &t));
    }
}
