//! Tickets: unique, strictly ordered lock requests.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one lock instance; stamped into every ticket it issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LockId(NonZeroU64);

impl LockId {
    pub(crate) fn next() -> Self {
        let raw = NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 locks to wrap.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock{}", self.0)
    }
}

/// A single lock request.
///
/// Tickets are issued by [`TicketRwLock::get_ticket`](super::TicketRwLock::get_ticket)
/// and carry their arrival position, which is the only fairness ranking the
/// lock uses. A ticket is single-use: once released or abandoned, every
/// further operation on it is rejected with a [`UsageError`](crate::UsageError).
///
/// Tickets are `Copy` so that misuse (double release, release with the wrong
/// role, use on another lock) is detected at runtime instead of being
/// impossible to express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Ticket {
    lock: LockId,
    position: u64,
}

impl Ticket {
    pub(crate) const fn new(lock: LockId, position: u64) -> Self {
        Self { lock, position }
    }

    /// Arrival position within the issuing lock. Earlier tickets have smaller
    /// positions.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// The lock that issued this ticket.
    #[must_use]
    pub const fn lock_id(&self) -> LockId {
        self.lock
    }

    /// Returns true if this ticket was issued before `other` by the same lock.
    #[must_use]
    pub fn precedes(&self, other: &Self) -> bool {
        self.lock == other.lock && self.position < other.position
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.position, self.lock)
    }
}

/// The role a ticket requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Role {
    /// Shared access.
    Reader,
    /// Exclusive access.
    Writer,
}

impl Role {
    /// Returns a lowercase name for logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observable state of an outstanding ticket.
///
/// Released and abandoned tickets are no longer outstanding and have no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TicketState {
    /// Issued; no acquire call has registered a role yet.
    Issued,
    /// A role is registered and the acquire call is waiting for its turn.
    Pending,
    /// The acquire call returned; the ticket holds the lock.
    Holding,
}
