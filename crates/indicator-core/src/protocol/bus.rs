//! Response bus
//!
//! A single-slot rendezvous between the link reader, which publishes
//! classified outcomes, and the one command waiting for its response.
//!
//! The slot holds at most one [`PendingCommand`]. Publishing resolves and
//! removes it. With nobody waiting, the outcome is dropped. A waiter that
//! hits its deadline removes its own slot before giving up, so an outcome and
//! a timeout can never both resolve the same command.
//!
//! A slot can be tied to one link generation. Shutting that link down cancels
//! only its own slot, so a command armed on the next link is left alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{ProtocolError, ResponseOutcome};

/// The command currently waiting for a response
#[derive(Debug)]
struct PendingCommand {
    /// Generation id, so a stale waiter never clears a newer slot
    id: u64,
    /// Command text, for logging
    command: String,
    /// Link generation the command was written to, `None` for any link
    link: Option<u64>,
    resolver: oneshot::Sender<ResponseOutcome>,
}

/// Single-slot broadcast of classified outcomes
#[derive(Debug, Default)]
pub struct ResponseBus {
    slot: Mutex<Option<PendingCommand>>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl ResponseBus {
    /// Create an idle bus
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<PendingCommand>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand an outcome to the pending command.
    ///
    /// Returns `false` if nobody was waiting and the outcome was dropped.
    pub fn publish(&self, outcome: ResponseOutcome) -> bool {
        let pending = self.slot().take();
        let Some(pending) = pending else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(?outcome, "no pending command, dropping outcome");
            return false;
        };

        match pending.resolver.send(outcome) {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(command = %pending.command, "response delivered");
                true
            }
            Err(outcome) => {
                // Receiver already gone: the waiter was cancelled mid-flight
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(command = %pending.command, ?outcome, "waiter gone, dropping outcome");
                false
            }
        }
    }

    /// Register `command` as the pending command.
    ///
    /// Arm before writing the command so a fast response cannot arrive while
    /// nobody is listening.
    pub fn arm(&self, command: &str) -> Result<Waiter<'_>, ProtocolError> {
        self.arm_slot(command, None)
    }

    /// Register `command` as written to link generation `link`
    pub(crate) fn arm_on_link(
        &self,
        command: &str,
        link: u64,
    ) -> Result<Waiter<'_>, ProtocolError> {
        self.arm_slot(command, Some(link))
    }

    fn arm_slot(&self, command: &str, link: Option<u64>) -> Result<Waiter<'_>, ProtocolError> {
        let mut slot = self.slot();
        if let Some(current) = slot.as_ref() {
            if !current.resolver.is_closed() {
                warn!(
                    pending = %current.command,
                    command,
                    "refusing a second concurrent response wait"
                );
                return Err(ProtocolError::WaiterBusy);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (resolver, rx) = oneshot::channel();
        *slot = Some(PendingCommand {
            id,
            command: command.to_string(),
            link,
            resolver,
        });

        Ok(Waiter { bus: self, id, rx })
    }

    /// Wait for the next outcome, or [`ResponseOutcome::timeout`] at `deadline`
    pub async fn await_next(
        &self,
        command: &str,
        deadline: Instant,
    ) -> Result<ResponseOutcome, ProtocolError> {
        let waiter = self.arm(command)?;
        Ok(waiter
            .wait(deadline)
            .await
            .unwrap_or_else(ResponseOutcome::timeout))
    }

    /// Abandon the pending command, if any. Its waiter wakes with no outcome.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.slot().take() {
            debug!(command = %pending.command, "cancelling pending command");
        }
    }

    /// Abandon the pending command if it belongs to link generation `link` or
    /// to no particular link
    pub(crate) fn cancel_link(&self, link: u64) {
        let mut slot = self.slot();
        if slot
            .as_ref()
            .is_some_and(|pending| pending.link.map_or(true, |l| l == link))
        {
            if let Some(pending) = slot.take() {
                debug!(command = %pending.command, link, "link gone, cancelling pending command");
            }
        }
    }

    /// Check if a command is waiting for a response
    pub fn has_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|pending| !pending.resolver.is_closed())
    }

    /// Outcomes handed to a waiter so far
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Outcomes discarded because nobody was waiting
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn release(&self, id: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|pending| pending.id == id) {
            *slot = None;
        }
    }
}

/// Receiving side of an armed [`ResponseBus`] slot.
///
/// Dropping it without waiting frees the slot.
#[derive(Debug)]
pub struct Waiter<'a> {
    bus: &'a ResponseBus,
    id: u64,
    rx: oneshot::Receiver<ResponseOutcome>,
}

impl Waiter<'_> {
    /// Wait until an outcome is published or `deadline` passes.
    ///
    /// Returns `None` on deadline, or when the slot was cancelled.
    pub async fn wait(mut self, deadline: Instant) -> Option<ResponseOutcome> {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(_)) => None,
            Err(_) => {
                self.bus.release(self.id);
                // A publish that took the slot before the release still wins
                self.rx.try_recv().ok()
            }
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.bus.release(self.id);
    }
}
