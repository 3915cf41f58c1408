//! Error types for the ticket lock.
//!
//! Errors fall into two groups:
//!
//! - **Usage errors** ([`UsageError`]): the caller broke the ticket contract
//!   (double acquire, double release, wrong role, foreign ticket, touching a
//!   guard's ticket). They are reported at the violating call and leave the
//!   lock state untouched.
//! - **Acquisition outcomes** ([`AcquireError`], [`TryAcquireError`],
//!   [`LockError`], [`TryLockError`]): timeouts, contention, and poisoning.
//!
//! Nothing here is an I/O failure; the lock is purely in-memory.

use std::time::Duration;

use crate::sync::{Role, Ticket};

/// A ticket was used in a way the lock contract forbids.
///
/// Every variant signals a bug in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// The ticket was issued by a different lock.
    #[error("ticket {ticket} was issued by another lock")]
    ForeignTicket {
        /// The offending ticket.
        ticket: Ticket,
    },
    /// The ticket is not outstanding: already released, abandoned, or never
    /// issued.
    #[error("ticket {ticket} is not outstanding (released or abandoned)")]
    UnknownTicket {
        /// The offending ticket.
        ticket: Ticket,
    },
    /// An acquire call already registered a role for this ticket.
    #[error("ticket {ticket} was already acquired as {role}")]
    AlreadyAcquired {
        /// The offending ticket.
        ticket: Ticket,
        /// The role registered by the first acquire.
        role: Role,
    },
    /// Release was called on a ticket that does not hold the lock.
    #[error("ticket {ticket} does not hold the lock")]
    NotHeld {
        /// The offending ticket.
        ticket: Ticket,
    },
    /// Release was called with the wrong role.
    #[error("ticket {ticket} holds as {actual}, released as {expected}")]
    WrongRole {
        /// The offending ticket.
        ticket: Ticket,
        /// The role the release call assumed.
        expected: Role,
        /// The role the ticket actually holds.
        actual: Role,
    },
    /// Abandon was called on a ticket that holds the lock.
    #[error("ticket {ticket} holds as {role}; release it instead of abandoning")]
    StillHeld {
        /// The offending ticket.
        ticket: Ticket,
        /// The role the ticket holds.
        role: Role,
    },
    /// The ticket belongs to a guard; only the guard may release or withdraw
    /// it.
    #[error("ticket {ticket} belongs to a guard")]
    GuardOwned {
        /// The offending ticket.
        ticket: Ticket,
    },
}

impl UsageError {
    /// The ticket the violating call was made with.
    #[must_use]
    pub const fn ticket(&self) -> Ticket {
        match self {
            Self::ForeignTicket { ticket }
            | Self::UnknownTicket { ticket }
            | Self::AlreadyAcquired { ticket, .. }
            | Self::NotHeld { ticket }
            | Self::WrongRole { ticket, .. }
            | Self::StillHeld { ticket, .. }
            | Self::GuardOwned { ticket } => *ticket,
        }
    }
}

/// Error returned by the timed acquire calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// The ticket contract was violated.
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// The deadline passed before the ticket's turn came. The ticket has been
    /// abandoned.
    #[error("ticket {ticket} timed out after {waited:?}")]
    TimedOut {
        /// The abandoned ticket.
        ticket: Ticket,
        /// How long the call waited.
        waited: Duration,
    },
}

/// Error returned by the guard helpers that do not wait indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryAcquireError {
    /// An earlier conflicting ticket is queued or holding.
    #[error("ticket lock is contended")]
    WouldBlock,
    /// The deadline passed before the request's turn came.
    #[error("ticket lock acquisition timed out after {waited:?}")]
    TimedOut {
        /// How long the call waited.
        waited: Duration,
    },
}

/// Error returned when acquiring a [`FairRwLock`](crate::FairRwLock) fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// A panic occurred while a guard was held.
    #[error("fair rwlock poisoned")]
    Poisoned,
    /// The deadline passed before the request's turn came.
    #[error("fair rwlock acquisition timed out after {waited:?}")]
    TimedOut {
        /// How long the call waited.
        waited: Duration,
    },
}

/// Error returned when trying to acquire a [`FairRwLock`](crate::FairRwLock)
/// without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryLockError {
    /// An earlier conflicting request is queued or holding.
    #[error("fair rwlock is locked")]
    Locked,
    /// A panic occurred while a guard was held.
    #[error("fair rwlock poisoned")]
    Poisoned,
}
