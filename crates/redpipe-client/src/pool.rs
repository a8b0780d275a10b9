//! Resilient connection pool.
//!
//! The pool supervises a fixed number of connection actors. Requests are
//! routed round-robin across the members that have reported ready; members
//! that terminate are re-created through the circuit breaker, so a dead
//! server costs at most one creation attempt per breaker permission
//! instead of a reconnect storm.
//!
//! The supervisor is itself an actor: all slot and breaker state is
//! private to its task and reached only through messages, and it owns
//! every timer (the breaker's open-period wake-up and the per-creation
//! readiness deadline).

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use redpipe_common::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::connection::{
    ChildId, ConnectionEvent, ConnectionFactory, ConnectionHandle, ConnectionRequest, ExecuteOutcome,
};
use crate::error::{RedpipeError, Result};

/// Grace period for children to finish when the pool shuts down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Requests the pool accepts from the facade.
pub(crate) enum PoolRequest {
    Execute {
        command: Command,
        reply: oneshot::Sender<ExecuteOutcome>,
    },
    ExecuteClose {
        command: Command,
        done: oneshot::Sender<Result<()>>,
    },
    /// The ready member ids, for `wait_until_connected`.
    GetRoutees {
        reply: oneshot::Sender<Vec<ChildId>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// One member position in the pool.
enum Slot {
    Empty,
    /// A child was spawned and has until `since + half_open_timeout` to
    /// report ready.
    Creating {
        child: ChildId,
        since: Instant,
        handle: ConnectionHandle,
    },
    Ready {
        child: ChildId,
        handle: ConnectionHandle,
    },
    /// The child terminated; awaiting breaker permission to re-create.
    Broken,
}

pub(crate) struct PoolSupervisor {
    factory: Arc<dyn ConnectionFactory>,
    breaker: CircuitBreaker,
    slots: Vec<Slot>,
    next_child_id: ChildId,
    rr_cursor: usize,
    mailbox: mpsc::Receiver<PoolRequest>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl PoolSupervisor {
    /// Spawns the supervisor task and returns its mailbox.
    pub(crate) fn spawn(
        size: usize,
        factory: Arc<dyn ConnectionFactory>,
        breaker: CircuitBreaker,
    ) -> mpsc::Sender<PoolRequest> {
        let (sender, mailbox) = mpsc::channel(1024);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            factory,
            breaker,
            slots: (0..size.max(1)).map(|_| Slot::Empty).collect(),
            next_child_id: 0,
            rr_cursor: 0,
            mailbox,
            events_tx,
            events_rx,
        };
        tokio::spawn(supervisor.run());
        sender
    }

    async fn run(mut self) {
        self.maintain();
        loop {
            let wake = self.next_deadline();
            tokio::select! {
                request = self.mailbox.recv() => match request {
                    Some(PoolRequest::Execute { command, reply }) => {
                        self.route(ConnectionRequest::Execute { command, reply });
                    }
                    Some(PoolRequest::ExecuteClose { command, done }) => {
                        self.route(ConnectionRequest::ExecuteClose { command, done });
                    }
                    Some(PoolRequest::GetRoutees { reply }) => {
                        let _ = reply.send(self.ready_children());
                    }
                    Some(PoolRequest::Shutdown { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    // The facade is gone; stop quietly.
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                _ = sleep_until_opt(wake) => {}
            }
            self.sweep_overdue();
            self.maintain();
        }
    }

    /// Routes one request to a ready member, round-robin.
    ///
    /// A member whose mailbox is closed or full is skipped; with no
    /// routable member left the request fails with `NoReadyConnection`.
    fn route(&mut self, request: ConnectionRequest) {
        let ready: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Ready { .. }))
            .map(|(idx, _)| idx)
            .collect();
        if ready.is_empty() {
            fail_request(request, RedpipeError::NoReadyConnection);
            return;
        }

        let start = self.rr_cursor;
        self.rr_cursor = self.rr_cursor.wrapping_add(1);

        let mut request = request;
        for attempt in 0..ready.len() {
            let idx = ready[(start + attempt) % ready.len()];
            let Slot::Ready { handle, child } = &self.slots[idx] else {
                continue;
            };
            match handle.sender.try_send(request) {
                Ok(()) => {
                    debug!(connection = *child, "routed request");
                    return;
                }
                Err(mpsc::error::TrySendError::Full(returned)) => {
                    request = returned;
                }
                Err(mpsc::error::TrySendError::Closed(returned)) => {
                    // Termination event is still in flight; skip the slot.
                    request = returned;
                }
            }
        }
        fail_request(request, RedpipeError::NoReadyConnection);
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Ready { id } => {
                let deadline = self.breaker.config().half_open_timeout;
                let Some(idx) = self.slot_of(id) else { return };
                if !matches!(self.slots[idx], Slot::Creating { .. }) {
                    return;
                }
                let Slot::Creating { child, since, handle } =
                    std::mem::replace(&mut self.slots[idx], Slot::Broken)
                else {
                    return;
                };
                if since.elapsed() >= deadline {
                    // Ready, but past the deadline: counts as a failed
                    // creation; the slot is re-created through the breaker.
                    warn!(connection = child, "connection became ready after its deadline");
                    handle.task.abort();
                    self.breaker.record_failure(Instant::now());
                    return;
                }
                info!(connection = child, "pool member ready");
                self.breaker.record_success();
                self.slots[idx] = Slot::Ready { child, handle };
            }
            ConnectionEvent::Terminated { id, cause } => {
                let Some(idx) = self.slot_of(id) else { return };
                match std::mem::replace(&mut self.slots[idx], Slot::Broken) {
                    Slot::Creating { child, .. } => {
                        warn!(connection = child, cause = %cause, "connection failed during creation");
                        self.breaker.record_failure(Instant::now());
                    }
                    Slot::Ready { child, .. } => {
                        // Steady-state death is not a breaker failure; the
                        // re-creation attempt's outcome will be.
                        warn!(connection = child, cause = %cause, "pool member terminated");
                    }
                    other => self.slots[idx] = other,
                }
            }
        }
    }

    /// Fails creations that missed the readiness deadline.
    fn sweep_overdue(&mut self) {
        let deadline = self.breaker.config().half_open_timeout;
        let now = Instant::now();
        for idx in 0..self.slots.len() {
            let overdue = matches!(
                &self.slots[idx],
                Slot::Creating { since, .. } if now.duration_since(*since) >= deadline
            );
            if !overdue {
                continue;
            }
            if let Slot::Creating { child, handle, .. } =
                std::mem::replace(&mut self.slots[idx], Slot::Broken)
            {
                warn!(connection = child, "connection missed its readiness deadline");
                handle.task.abort();
                self.breaker.record_failure(now);
            }
        }
    }

    /// Creates children for vacant slots as long as the breaker permits.
    fn maintain(&mut self) {
        let now = Instant::now();
        for idx in 0..self.slots.len() {
            if !matches!(self.slots[idx], Slot::Empty | Slot::Broken) {
                continue;
            }
            if !self.breaker.try_acquire(now) {
                break;
            }
            let child = self.next_child_id;
            self.next_child_id += 1;
            debug!(connection = child, slot = idx, "creating pool member");
            let handle = self.factory.spawn(child, self.events_tx.clone());
            self.slots[idx] = Slot::Creating { child, since: now, handle };
        }
    }

    /// The earliest instant anything scheduled needs attention: a breaker
    /// re-attempt or a creation deadline.
    fn next_deadline(&self) -> Option<Instant> {
        let mut next = self.breaker.next_attempt_at();
        let deadline = self.breaker.config().half_open_timeout;
        for slot in &self.slots {
            if let Slot::Creating { since, .. } = slot {
                let at = *since + deadline;
                next = Some(match next {
                    Some(n) => n.min(at),
                    None => at,
                });
            }
        }
        next
    }

    fn ready_children(&self) -> Vec<ChildId> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Ready { child, .. } => Some(*child),
                _ => None,
            })
            .collect()
    }

    fn slot_of(&self, id: ChildId) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            Slot::Creating { child, .. } | Slot::Ready { child, .. } => *child == id,
            _ => false,
        })
    }

    /// Releases every child and waits out the grace period.
    async fn shutdown(&mut self) {
        info!("pool shutting down");
        let mut tasks = Vec::new();
        for slot in self.slots.iter_mut() {
            match std::mem::replace(slot, Slot::Empty) {
                Slot::Creating { handle, .. } | Slot::Ready { handle, .. } => {
                    let ConnectionHandle { sender, task } = handle;
                    // Closing the mailbox lets the actor finish its tail.
                    drop(sender);
                    tasks.push(task);
                }
                _ => {}
            }
        }
        if tasks.is_empty() {
            return;
        }
        if timeout(SHUTDOWN_GRACE, join_all(tasks.iter_mut())).await.is_err() {
            warn!("shutdown grace period expired; aborting remaining connections");
            for task in &tasks {
                task.abort();
            }
        }
    }
}

fn fail_request(request: ConnectionRequest, err: RedpipeError) {
    match request {
        ConnectionRequest::Execute { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        ConnectionRequest::ExecuteClose { done, .. } => {
            let _ = done.send(Err(err));
        }
    }
}

async fn sleep_until_opt(wake: Option<Instant>) {
    match wake {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
