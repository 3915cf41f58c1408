//! Diagnostics snapshots.
//!
//! The ticket lock cannot tell an abandoned ticket from a slow one, so it
//! exposes enough state for callers to spot one: queue length, the oldest
//! ticket that does not hold, and how long it has been waiting.
//!
//! # Example
//!
//! ```ignore
//! let stats = lock.stats();
//! if let Some(age) = stats.oldest_pending_age {
//!     if age > Duration::from_secs(30) {
//!         tracing::warn!(ticket = ?stats.oldest_pending, "ticket stuck");
//!     }
//! }
//! ```

use std::time::Duration;

use super::ticket::{Role, Ticket, TicketState};

/// Point-in-time view of a lock's queue and counters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LockStats {
    /// Name from the lock's configuration.
    pub name: &'static str,
    /// Outstanding tickets (issued, pending, and holding).
    pub queue_len: usize,
    /// Reader tickets registered but not yet holding.
    pub pending_readers: usize,
    /// Writer tickets registered but not yet holding.
    pub pending_writers: usize,
    /// Issued tickets with no acquire call yet.
    pub idle_tickets: usize,
    /// Readers currently holding.
    pub holding_readers: usize,
    /// Whether a writer currently holds.
    pub writer_holding: bool,
    /// Earliest ticket that does not hold the lock.
    pub oldest_pending: Option<Ticket>,
    /// How long `oldest_pending` has been outstanding.
    pub oldest_pending_age: Option<Duration>,
    /// Tickets issued since creation.
    pub issued: u64,
    /// Read acquisitions since creation.
    pub acquired_reads: u64,
    /// Write acquisitions since creation.
    pub acquired_writes: u64,
    /// Releases since creation.
    pub released: u64,
    /// Tickets abandoned since creation, timeouts and failed `try_*` included.
    pub abandoned: u64,
    /// Timed acquires that gave up.
    pub timed_out: u64,
    /// Times a blocked waiter woke and re-checked its turn.
    pub wakeups: u64,
}

impl LockStats {
    /// Returns true if no ticket is outstanding.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.queue_len == 0
    }
}

/// One outstanding ticket as seen by [`TicketRwLock::queue_snapshot`](super::TicketRwLock::queue_snapshot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TicketSnapshot {
    /// The ticket.
    pub ticket: Ticket,
    /// Registered role, if an acquire call has been made.
    pub role: Option<Role>,
    /// Lifecycle state.
    pub state: TicketState,
    /// Time since issuance.
    pub age: Duration,
}
