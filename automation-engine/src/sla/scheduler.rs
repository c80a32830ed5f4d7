use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use shared::{CoreError, CoreResult, DeadlineKind, SlaPolicy, TicketEvent};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditFeed};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::sla::SlaClock;
use crate::store::TicketStore;

/// Heap entry: one potential deadline firing.
///
/// Entries are immutable once pushed. Deregistration and recompute never
/// touch the heap; they drop the clock or replace its generation with a
/// freshly issued one, and stale entries are discarded when they surface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DueEntry {
    due_at: i64,
    ticket_id: String,
    kind: DeadlineKind,
    generation: u64,
}

pub enum SchedulerCommand {
    Register {
        ticket_id: String,
        anchor: i64,
        policy: SlaPolicy,
    },
    Deregister {
        ticket_id: String,
    },
    Recompute {
        ticket_id: String,
        /// `None` keeps the clock's current anchor (policy-only change).
        anchor: Option<i64>,
        policy: SlaPolicy,
    },
    /// Run a fire pass immediately and ack when it is done. Commands are
    /// processed in order, so the ack also proves earlier commands landed.
    Tick(oneshot::Sender<()>),
    /// Report how many tickets currently carry a live clock.
    Tracked(oneshot::Sender<usize>),
}

/// Cheap cloneable front for the scheduler task.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub async fn register(&self, ticket_id: &str, anchor: i64, policy: SlaPolicy) -> CoreResult<()> {
        self.send(SchedulerCommand::Register {
            ticket_id: ticket_id.to_string(),
            anchor,
            policy,
        })
        .await
    }

    pub async fn deregister(&self, ticket_id: &str) -> CoreResult<()> {
        self.send(SchedulerCommand::Deregister {
            ticket_id: ticket_id.to_string(),
        })
        .await
    }

    pub async fn recompute(
        &self,
        ticket_id: &str,
        anchor: Option<i64>,
        policy: SlaPolicy,
    ) -> CoreResult<()> {
        self.send(SchedulerCommand::Recompute {
            ticket_id: ticket_id.to_string(),
            anchor,
            policy,
        })
        .await
    }

    /// Force a fire pass and wait for it to finish.
    pub async fn tick(&self) -> CoreResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(SchedulerCommand::Tick(ack_tx)).await?;
        ack_rx.await.map_err(|_| CoreError::ShuttingDown)
    }

    /// Number of tickets with a live clock. Health gauge.
    pub async fn tracked_tickets(&self) -> CoreResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerCommand::Tracked(tx)).await?;
        rx.await.map_err(|_| CoreError::ShuttingDown)
    }

    async fn send(&self, cmd: SchedulerCommand) -> CoreResult<()> {
        self.tx.send(cmd).await.map_err(|_| CoreError::ShuttingDown)
    }
}

/// Single task driving every ticket's SLA clock.
///
/// Wakes when a command arrives or the coarse tick interval elapses,
/// then fires everything whose due time has passed. Deadline events go
/// out on `event_tx` (the same pump the rule engine consumes) and on
/// the audit feed.
pub struct SlaScheduler {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    event_tx: mpsc::Sender<TicketEvent>,
    audit: AuditFeed,
    rx: mpsc::Receiver<SchedulerCommand>,
    heap: BinaryHeap<Reverse<DueEntry>>,
    clocks: HashMap<String, SlaClock>,
    /// Source of clock generations. Never reused, so heap entries left
    /// over from a ticket's earlier clock can never match a later one.
    next_generation: u64,
}

impl SlaScheduler {
    pub fn new(
        store: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        event_tx: mpsc::Sender<TicketEvent>,
        audit: AuditFeed,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(config.event_buffer);
        let scheduler = Self {
            store,
            clock,
            config,
            event_tx,
            audit,
            rx,
            heap: BinaryHeap::new(),
            clocks: HashMap::new(),
            next_generation: 0,
        };
        (scheduler, SchedulerHandle { tx })
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let tick = Duration::from_millis(self.config.tick_interval_ms);
        info!(tick_ms = self.config.tick_interval_ms, "sla scheduler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                _ = tokio::time::sleep(tick) => self.fire_due().await,
            }
        }
        info!("sla scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::Register {
                ticket_id,
                anchor,
                policy,
            } => {
                let clock = SlaClock::new(anchor, policy, self.issue_generation());
                self.push_pending(&ticket_id, &clock);
                debug!(ticket_id = %ticket_id, anchor, generation = clock.generation(), "sla clock registered");
                self.clocks.insert(ticket_id, clock);
            }
            SchedulerCommand::Deregister { ticket_id } => {
                if self.clocks.remove(&ticket_id).is_some() {
                    debug!(ticket_id = %ticket_id, "sla clock destroyed");
                }
            }
            SchedulerCommand::Recompute {
                ticket_id,
                anchor,
                policy,
            } => {
                let generation = self.issue_generation();
                if let Some(clock) = self.clocks.get_mut(&ticket_id) {
                    let anchor = anchor.unwrap_or_else(|| clock.anchor());
                    clock.recompute(anchor, policy, generation);
                    let clock = clock.clone();
                    self.push_pending(&ticket_id, &clock);
                    debug!(ticket_id = %ticket_id, generation = clock.generation(), "sla clock recomputed");
                }
            }
            SchedulerCommand::Tick(ack) => {
                self.fire_due().await;
                let _ = ack.send(());
            }
            SchedulerCommand::Tracked(reply) => {
                let _ = reply.send(self.clocks.len());
            }
        }
    }

    fn issue_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    fn push_pending(&mut self, ticket_id: &str, clock: &SlaClock) {
        for kind in clock.pending_kinds() {
            self.heap.push(Reverse(DueEntry {
                due_at: clock.due_at(kind),
                ticket_id: ticket_id.to_string(),
                kind,
                generation: clock.generation(),
            }));
        }
    }

    /// Pop and handle every entry whose due time has passed. A late
    /// firing is still a firing; each (ticket, kind) fires at most once
    /// per clock generation.
    async fn fire_due(&mut self) {
        let now = self.clock.now_millis();
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(head)| head.due_at <= now)
        {
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            let Some(clock) = self.clocks.get(&entry.ticket_id) else {
                continue; // deregistered
            };
            if entry.generation != clock.generation() || clock.is_fired(entry.kind) {
                continue; // superseded by a recompute, or already fired
            }

            let ticket = match self.store.get(&entry.ticket_id).await {
                Ok(ticket) => ticket,
                Err(err) => {
                    warn!(ticket_id = %entry.ticket_id, error = %err, "dropping clock for unloadable ticket");
                    self.clocks.remove(&entry.ticket_id);
                    continue;
                }
            };

            // A ticket can reach a terminal status without a Deregister,
            // e.g. resolved by a rule action. Its clock is dead weight;
            // drop it here rather than leave it in the map.
            if ticket.status.is_sla_terminal() {
                self.clocks.remove(&entry.ticket_id);
                continue;
            }

            match entry.kind {
                DeadlineKind::Response => {
                    // Satisfied deadlines evaporate without an event.
                    if ticket.first_response_at.is_some() {
                        continue;
                    }
                }
                DeadlineKind::Resolution => {}
                DeadlineKind::Escalation => {
                    // Escalation only makes sense once the resolution
                    // breach is on the record. A policy with an escalation
                    // budget shorter than the resolution budget gets its
                    // escalation deferred to the resolution due time.
                    if !clock.is_fired(DeadlineKind::Resolution) {
                        let due_at = clock.due_at(DeadlineKind::Resolution).max(now + 1);
                        self.heap.push(Reverse(DueEntry {
                            due_at,
                            ticket_id: entry.ticket_id.clone(),
                            kind: DeadlineKind::Escalation,
                            generation: entry.generation,
                        }));
                        continue;
                    }
                }
            }

            let mut all_fired = false;
            if let Some(clock) = self.clocks.get_mut(&entry.ticket_id) {
                clock.mark_fired(entry.kind);
                all_fired = clock.all_fired();
            }
            info!(
                ticket_id = %entry.ticket_id,
                kind = %entry.kind,
                due_at = entry.due_at,
                fired_at = now,
                "sla deadline elapsed"
            );
            self.audit.publish(AuditEvent::DeadlineFired {
                ticket_id: entry.ticket_id.clone(),
                kind: entry.kind,
                fired_at: now,
            });
            if self
                .event_tx
                .send(TicketEvent::deadline_elapsed(&entry.ticket_id, entry.kind, now))
                .await
                .is_err()
            {
                warn!("event pump closed, stopping deadline delivery");
                return;
            }
            if all_fired {
                // Nothing left to track for this ticket.
                self.clocks.remove(&entry.ticket_id);
            }
        }
    }
}
