//! Ticket Store boundary
//!
//! The engine never assumes a concrete database; it only requires that
//! `save` is atomic per ticket. [`MemoryTicketStore`] is the process-scoped
//! implementation used by tests and single-node deployments: initialized at
//! startup, mutated only through these operations.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use shared::error::{CoreError, CoreResult};
use shared::models::Ticket;
use shared::predicate::Predicate;

use crate::filter;

/// Abstract ticket persistence boundary.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get(&self, ticket_id: &str) -> CoreResult<Ticket>;

    /// Insert or replace. Must be atomic per ticket.
    async fn save(&self, ticket: Ticket) -> CoreResult<()>;

    /// Tickets matching `predicate`, in insertion order.
    async fn query(&self, predicate: &Predicate) -> CoreResult<Vec<Ticket>>;
}

/// In-memory store: dashmap keyed by id plus an insertion-order index so
/// queries return a stable order.
#[derive(Debug, Default)]
pub struct MemoryTicketStore {
    tickets: DashMap<String, Ticket>,
    insertion_order: RwLock<Vec<String>>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn get(&self, ticket_id: &str) -> CoreResult<Ticket> {
        self.tickets
            .get(ticket_id)
            .map(|t| t.clone())
            .ok_or_else(|| CoreError::TicketNotFound(ticket_id.to_string()))
    }

    async fn save(&self, ticket: Ticket) -> CoreResult<()> {
        let id = ticket.id.clone();
        let existed = self.tickets.insert(id.clone(), ticket).is_some();
        if !existed {
            self.insertion_order.write().push(id);
        }
        Ok(())
    }

    async fn query(&self, predicate: &Predicate) -> CoreResult<Vec<Ticket>> {
        let order = self.insertion_order.read().clone();
        let mut matched = Vec::new();
        for id in order {
            if let Some(ticket) = self.tickets.get(&id)
                && filter::evaluate(predicate, &ticket)
            {
                matched.push(ticket.clone());
            }
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{Priority, TicketStatus};
    use shared::predicate::{Field, Operator, Value};

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = MemoryTicketStore::new();
        store
            .save(Ticket::new("tkt-1", "support", Priority::Low, 1))
            .await
            .unwrap();
        let t = store.get("tkt-1").await.unwrap();
        assert_eq!(t.department, "support");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = MemoryTicketStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(CoreError::TicketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn query_returns_insertion_order_after_updates() {
        let store = MemoryTicketStore::new();
        for id in ["b", "a", "c"] {
            store
                .save(Ticket::new(id, "support", Priority::Low, 1))
                .await
                .unwrap();
        }
        // Re-saving must not move a ticket to the back
        let mut a = store.get("a").await.unwrap();
        a.priority = Priority::High;
        store.save(a).await.unwrap();

        let p = Predicate::comparison(
            Field::Status,
            Operator::Equals,
            Value::Status(TicketStatus::New),
        )
        .unwrap();
        let ids: Vec<String> = store
            .query(&p)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
