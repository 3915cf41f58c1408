//! Scoped guards for [`TicketRwLock`].
//!
//! A guard owns a ticket that already holds the lock and releases it on drop,
//! on every exit path including unwinding.
//!
//! A guard's ticket is visible through the lock's diagnostics, but the queue
//! marks it guard-owned and rejects every caller-facing acquire, release or
//! abandon on it. The guard is the only thing that can remove it, so the
//! release in `Drop` cannot fail; the `debug_assert!` there checks that.

use std::fmt;
use std::sync::Arc;

use super::rwlock::TicketRwLock;
use super::ticket::{Role, Ticket};

/// Shared access to a [`TicketRwLock`], released on drop.
#[must_use = "guard will be immediately released if not held"]
pub struct ReadGuard<'a> {
    lock: &'a TicketRwLock,
    ticket: Ticket,
}

impl<'a> ReadGuard<'a> {
    pub(crate) const fn new(lock: &'a TicketRwLock, ticket: Ticket) -> Self {
        Self { lock, ticket }
    }

    /// Arrival position of the guard's ticket.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.ticket.position()
    }
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        let released = self.lock.release_guard(self.ticket, Role::Reader);
        debug_assert!(released.is_ok(), "read guard release failed: {released:?}");
    }
}

impl fmt::Debug for ReadGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to a [`TicketRwLock`], released on drop.
#[must_use = "guard will be immediately released if not held"]
pub struct WriteGuard<'a> {
    lock: &'a TicketRwLock,
    ticket: Ticket,
}

impl<'a> WriteGuard<'a> {
    pub(crate) const fn new(lock: &'a TicketRwLock, ticket: Ticket) -> Self {
        Self { lock, ticket }
    }

    /// Arrival position of the guard's ticket.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.ticket.position()
    }
}

impl Drop for WriteGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        let released = self.lock.release_guard(self.ticket, Role::Writer);
        debug_assert!(released.is_ok(), "write guard release failed: {released:?}");
    }
}

impl fmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

/// Owned read guard that can be moved between threads.
#[must_use = "guard will be immediately released if not held"]
pub struct OwnedReadGuard {
    lock: Arc<TicketRwLock>,
    ticket: Ticket,
}

impl OwnedReadGuard {
    pub(crate) const fn new(lock: Arc<TicketRwLock>, ticket: Ticket) -> Self {
        Self { lock, ticket }
    }

    /// Arrival position of the guard's ticket.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.ticket.position()
    }

    /// The lock this guard holds.
    #[must_use]
    pub fn lock(&self) -> &Arc<TicketRwLock> {
        &self.lock
    }
}

impl Drop for OwnedReadGuard {
    fn drop(&mut self) {
        let released = self.lock.release_guard(self.ticket, Role::Reader);
        debug_assert!(released.is_ok(), "read guard release failed: {released:?}");
    }
}

impl fmt::Debug for OwnedReadGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedReadGuard")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}

/// Owned write guard that can be moved between threads.
#[must_use = "guard will be immediately released if not held"]
pub struct OwnedWriteGuard {
    lock: Arc<TicketRwLock>,
    ticket: Ticket,
}

impl OwnedWriteGuard {
    pub(crate) const fn new(lock: Arc<TicketRwLock>, ticket: Ticket) -> Self {
        Self { lock, ticket }
    }

    /// Arrival position of the guard's ticket.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.ticket.position()
    }

    /// The lock this guard holds.
    #[must_use]
    pub fn lock(&self) -> &Arc<TicketRwLock> {
        &self.lock
    }
}

impl Drop for OwnedWriteGuard {
    fn drop(&mut self) {
        let released = self.lock.release_guard(self.ticket, Role::Writer);
        debug_assert!(released.is_ok(), "write guard release failed: {released:?}");
    }
}

impl fmt::Debug for OwnedWriteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedWriteGuard")
            .field("ticket", &self.ticket)
            .finish_non_exhaustive()
    }
}
