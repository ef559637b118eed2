//! Single-slot debounce for outgoing infrared commands.
//!
//! A request replaces whatever is still waiting, so a burst of requests
//! settles into one transmission of the last command. The slot is driven by
//! an explicit `now_ms` clock; nothing here sleeps.
//!
//! ```text
//!   request()          deadline elapsed, take_due()
//!  ──────────► Requested ─────────────────────────► Committed
//!                  │
//!                  │ request() before deadline
//!                  ▼
//!              Superseded
//! ```

/// Identifies one call to [`Debouncer::request`].
pub type Ticket = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Requested,
    Committed,
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingDispatch<T> {
    pub ticket: Ticket,
    pub command: String,
    pub payload: T,
    pub due_ms: u64,
}

/// Result of scheduling a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requested {
    pub ticket: Ticket,
    pub due_ms: u64,
    pub superseded: Option<Ticket>,
}

#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    pending: Option<PendingDispatch<T>>,
    next_ticket: Ticket,
}

impl<T> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debouncer<T> {
    pub fn new() -> Self {
        Self {
            pending: None,
            next_ticket: 1,
        }
    }

    /// Schedules `command` at `now_ms + delay_ms`, dropping any dispatch that
    /// has not fired yet. A zero delay still waits for the next `take_due`.
    pub fn request(
        &mut self,
        command: impl Into<String>,
        payload: T,
        delay_ms: u64,
        now_ms: u64,
    ) -> Requested {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);

        let superseded = self.pending.take().map(|dispatch| dispatch.ticket);
        let due_ms = now_ms.saturating_add(delay_ms);
        self.pending = Some(PendingDispatch {
            ticket,
            command: command.into(),
            payload,
            due_ms,
        });

        Requested {
            ticket,
            due_ms,
            superseded,
        }
    }

    pub fn take_due(&mut self, now_ms: u64) -> Option<PendingDispatch<T>> {
        match &self.pending {
            Some(dispatch) if now_ms >= dispatch.due_ms => self.pending.take(),
            _ => None,
        }
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.pending.as_ref().map(|dispatch| dispatch.due_ms)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingDispatch<T>> {
        self.pending.as_ref()
    }
}
