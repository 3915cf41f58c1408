//! Fair, ticket-ordered reader/writer lock.
//!
//! Every request takes a [`Ticket`] first. The ticket's arrival position is
//! the only ranking the lock knows: a request waits exactly as long as an
//! earlier conflicting request is queued or a conflicting request holds.
//! Because positions never change and a request only ever waits on earlier
//! ones (or on current holders), every request eventually holds once the
//! requests ahead of it release.
//!
//! ## Fairness Characteristics
//!
//! | Scenario                          | Behavior                                |
//! |-----------------------------------|-----------------------------------------|
//! | Only readers                      | All hold concurrently                   |
//! | Reader arrives after a writer     | Waits for that writer to release        |
//! | Writer arrives after readers      | Waits for every earlier reader          |
//! | Writer arrives after a writer     | Waits; writers never hold together      |
//! | Readers between two writers       | Hold together once the first writer is done |
//!
//! Neither side starves: the queue is strictly FIFO across roles, and
//! adjacent readers are batched.
//!
//! ## Wake protocol
//!
//! Releases broadcast on one condition variable. Each woken waiter re-checks
//! its own predicate under the mutex and goes back to sleep if it still has to
//! wait. There is no targeted hand-off.
//!
//! ## Ticket contract
//!
//! A ticket goes `get_ticket` → `acquire_*` → `release_*`, once. Breaking the
//! sequence returns a [`UsageError`] and leaves the lock untouched. A ticket
//! that is issued and then forgotten blocks every later conflicting request;
//! call [`TicketRwLock::abandon`] instead of dropping it on the floor, or use
//! the guard helpers, which cannot leak.
//!
//! Guard tickets appear in [`TicketRwLock::queue_snapshot`] and
//! [`LockStats::oldest_pending`], but belong to their guard: acquiring,
//! releasing or abandoning one returns [`UsageError::GuardOwned`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ticketrw::TicketRwLock;
//!
//! let lock = Arc::new(TicketRwLock::new());
//!
//! let ticket = lock.get_ticket();
//! lock.acquire_write(ticket)?;
//! // ... exclusive section ...
//! lock.release_write(ticket)?;
//!
//! {
//!     let _a = lock.read_guard();
//!     let _b = lock.read_guard(); // readers share
//! }
//! # Ok::<(), ticketrw::UsageError>(())
//! ```

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::guard::{OwnedReadGuard, OwnedWriteGuard, ReadGuard, WriteGuard};
use super::queue::WaitQueue;
use super::stats::{LockStats, TicketSnapshot};
use super::ticket::{LockId, Role, Ticket, TicketState};
use crate::config::{ConfigError, LockConfig};
use crate::error::{AcquireError, TryAcquireError, UsageError};
use crate::tracing_compat::{debug, error, trace, warn};

/// How a wait for a ticket's turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    /// The ticket now holds.
    Granted(Duration),
    /// The deadline passed; the ticket is still registered.
    TimedOut(Duration),
    /// Someone else abandoned the ticket while it waited.
    Withdrawn,
}

/// A fair reader/writer lock ordered by ticket arrival.
///
/// The lock protects no data by itself; pair it with the data it guards, or
/// use [`FairRwLock`](crate::FairRwLock). Share it between threads through an
/// [`Arc`].
#[derive(Debug)]
pub struct TicketRwLock {
    id: LockId,
    state: Mutex<WaitQueue>,
    turn: Condvar,
    config: LockConfig,
}

impl Default for TicketRwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketRwLock {
    /// Creates a lock with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(LockConfig::default())
    }

    /// Creates a lock with the given configuration.
    pub fn with_config(config: LockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: LockConfig) -> Self {
        let id = LockId::next();
        Self {
            id,
            state: Mutex::new(WaitQueue::new(id)),
            turn: Condvar::new(),
            config,
        }
    }

    /// The identity stamped into this lock's tickets.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> LockId {
        self.id
    }

    /// The lock's configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Issues a ticket at the tail of the queue.
    ///
    /// Tickets are totally ordered by the order in which callers take the
    /// internal mutex. The ticket blocks later conflicting requests from the
    /// moment an acquire call registers its role, so it must be carried
    /// through acquire and release, or abandoned.
    pub fn get_ticket(&self) -> Ticket {
        let ticket = self.state.lock().issue(Instant::now());
        trace!(lock = self.config.name, %ticket, "ticket issued");
        ticket
    }

    /// Blocks until `ticket` may read: no earlier writer is queued and no
    /// writer holds.
    ///
    /// Returns an error without waiting if the ticket is foreign, not
    /// outstanding, or already acquired, and returns
    /// [`UsageError::UnknownTicket`] if another thread abandons the ticket
    /// while this call waits.
    pub fn acquire_read(&self, ticket: Ticket) -> Result<(), UsageError> {
        self.acquire(ticket, Role::Reader)
    }

    /// Blocks until `ticket` may write: no earlier reader or writer is queued
    /// and nobody holds.
    ///
    /// Errors as [`acquire_read`](Self::acquire_read).
    pub fn acquire_write(&self, ticket: Ticket) -> Result<(), UsageError> {
        self.acquire(ticket, Role::Writer)
    }

    /// Like [`acquire_read`](Self::acquire_read), but gives up after
    /// `timeout`. A ticket that times out is abandoned.
    pub fn acquire_read_timeout(&self, ticket: Ticket, timeout: Duration) -> Result<(), AcquireError> {
        self.acquire_until(ticket, Role::Reader, Instant::now().checked_add(timeout))
    }

    /// Like [`acquire_write`](Self::acquire_write), but gives up after
    /// `timeout`. A ticket that times out is abandoned.
    pub fn acquire_write_timeout(&self, ticket: Ticket, timeout: Duration) -> Result<(), AcquireError> {
        self.acquire_until(ticket, Role::Writer, Instant::now().checked_add(timeout))
    }

    /// Releases a reading ticket and wakes every waiter.
    pub fn release_read(&self, ticket: Ticket) -> Result<(), UsageError> {
        self.release(ticket, Role::Reader)
    }

    /// Releases a writing ticket and wakes every waiter.
    pub fn release_write(&self, ticket: Ticket) -> Result<(), UsageError> {
        self.release(ticket, Role::Writer)
    }

    /// Withdraws a ticket that does not hold the lock.
    ///
    /// Works for freshly issued tickets and for tickets whose acquire call is
    /// still waiting; the waiting call then returns
    /// [`UsageError::UnknownTicket`]. Holding tickets must be released
    /// instead, and guard tickets are rejected with
    /// [`UsageError::GuardOwned`].
    #[cfg_attr(not(feature = "tracing-integration"), allow(unused_variables))]
    pub fn abandon(&self, ticket: Ticket) -> Result<(), UsageError> {
        let mut queue = self.state.lock();
        let role = queue.abandon(ticket).inspect_err(|err| self.log_misuse(err))?;
        drop(queue);
        self.turn.notify_all();
        debug!(lock = self.config.name, %ticket, role = ?role, "ticket abandoned");
        Ok(())
    }

    /// Issues a ticket and blocks until it may read. The guard releases on
    /// drop, including during unwinding.
    pub fn read_guard(&self) -> ReadGuard<'_> {
        ReadGuard::new(self, self.enter(Role::Reader))
    }

    /// Issues a ticket and blocks until it may write. The guard releases on
    /// drop, including during unwinding.
    pub fn write_guard(&self) -> WriteGuard<'_> {
        WriteGuard::new(self, self.enter(Role::Writer))
    }

    /// [`read_guard`](Self::read_guard) for a shared handle; the guard owns a
    /// clone of the `Arc` and can move between threads.
    pub fn read_owned(self: &Arc<Self>) -> OwnedReadGuard {
        OwnedReadGuard::new(Arc::clone(self), self.enter(Role::Reader))
    }

    /// [`write_guard`](Self::write_guard) for a shared handle.
    pub fn write_owned(self: &Arc<Self>) -> OwnedWriteGuard {
        OwnedWriteGuard::new(Arc::clone(self), self.enter(Role::Writer))
    }

    /// Reads if that is possible right now without passing anyone.
    pub fn try_read(&self) -> Result<ReadGuard<'_>, TryAcquireError> {
        self.try_enter(Role::Reader)
            .map(|ticket| ReadGuard::new(self, ticket))
    }

    /// Writes if that is possible right now without passing anyone.
    pub fn try_write(&self) -> Result<WriteGuard<'_>, TryAcquireError> {
        self.try_enter(Role::Writer)
            .map(|ticket| WriteGuard::new(self, ticket))
    }

    /// [`read_guard`](Self::read_guard) that gives up after `timeout`.
    pub fn read_guard_timeout(&self, timeout: Duration) -> Result<ReadGuard<'_>, TryAcquireError> {
        self.enter_until(Role::Reader, Instant::now().checked_add(timeout))
            .map(|ticket| ReadGuard::new(self, ticket))
    }

    /// [`write_guard`](Self::write_guard) that gives up after `timeout`.
    pub fn write_guard_timeout(&self, timeout: Duration) -> Result<WriteGuard<'_>, TryAcquireError> {
        self.enter_until(Role::Writer, Instant::now().checked_add(timeout))
            .map(|ticket| WriteGuard::new(self, ticket))
    }

    /// Current queue and counters.
    pub fn stats(&self) -> LockStats {
        self.state.lock().stats(self.config.name, Instant::now())
    }

    /// Every outstanding ticket in arrival order.
    pub fn queue_snapshot(&self) -> Vec<TicketSnapshot> {
        self.state.lock().snapshot(Instant::now())
    }

    /// Number of outstanding tickets.
    pub fn queue_len(&self) -> usize {
        self.state.lock().len()
    }

    /// State of a ticket, or `None` once it is released or abandoned.
    pub fn ticket_state(&self, ticket: Ticket) -> Option<TicketState> {
        self.state.lock().state_of(ticket)
    }

    fn acquire(&self, ticket: Ticket, role: Role) -> Result<(), UsageError> {
        self.acquire_until(ticket, role, None)
            .map_err(|err| match err {
                AcquireError::Usage(usage) => usage,
                // Without a deadline the wait only ends early if the ticket
                // was abandoned from another thread.
                AcquireError::TimedOut { ticket, .. } => UsageError::UnknownTicket { ticket },
            })
    }

    #[cfg_attr(not(feature = "tracing-integration"), allow(unused_variables))]
    fn acquire_until(
        &self,
        ticket: Ticket,
        role: Role,
        deadline: Option<Instant>,
    ) -> Result<(), AcquireError> {
        let mut queue = self.state.lock();
        queue
            .register(ticket, role)
            .inspect_err(|err| self.log_misuse(err))?;

        match self.wait_turn(&mut queue, ticket, role, deadline) {
            Turn::Granted(waited) => {
                drop(queue);
                debug!(lock = self.config.name, %ticket, role = role.name(), ?waited, "acquired");
                Ok(())
            }
            Turn::TimedOut(waited) => {
                queue.abandon(ticket)?;
                queue.record_timeout();
                drop(queue);
                self.turn.notify_all();
                debug!(lock = self.config.name, %ticket, role = role.name(), ?waited, "acquire timed out");
                Err(AcquireError::TimedOut { ticket, waited })
            }
            Turn::Withdrawn => {
                drop(queue);
                debug!(lock = self.config.name, %ticket, role = role.name(), "abandoned while waiting");
                Err(UsageError::UnknownTicket { ticket }.into())
            }
        }
    }

    /// Waits on the condition variable until the registered `ticket` holds,
    /// the deadline passes, or the ticket disappears.
    fn wait_turn(
        &self,
        queue: &mut MutexGuard<'_, WaitQueue>,
        ticket: Ticket,
        role: Role,
        deadline: Option<Instant>,
    ) -> Turn {
        let position = ticket.position();
        let started = Instant::now();
        let mut stall_at = self
            .config
            .stall_warning
            .and_then(|threshold| started.checked_add(threshold));

        loop {
            if queue.state_of(ticket).is_none() {
                return Turn::Withdrawn;
            }
            if queue.is_eligible(position, role) {
                queue.grant(position, role);
                return Turn::Granted(started.elapsed());
            }

            let now = Instant::now();
            if deadline.is_some_and(|at| now >= at) {
                return Turn::TimedOut(now.saturating_duration_since(started));
            }
            if stall_at.is_some_and(|at| now >= at) {
                self.log_stall(queue, ticket, role, now.saturating_duration_since(started));
                stall_at = None;
            }

            match earliest(deadline, stall_at) {
                Some(at) => {
                    let _ = self.turn.wait_until(queue, at);
                }
                None => self.turn.wait(queue),
            }
            queue.record_wakeup();
            trace!(lock = self.config.name, %ticket, role = role.name(), "woke; rechecking turn");
        }
    }

    fn release(&self, ticket: Ticket, role: Role) -> Result<(), UsageError> {
        self.release_with(ticket, role, WaitQueue::release)
    }

    /// Releases a guard's own ticket. Called from the guards' `Drop`.
    pub(crate) fn release_guard(&self, ticket: Ticket, role: Role) -> Result<(), UsageError> {
        self.release_with(ticket, role, WaitQueue::release_guarded)
    }

    #[cfg_attr(not(feature = "tracing-integration"), allow(unused_variables))]
    fn release_with(
        &self,
        ticket: Ticket,
        role: Role,
        release: fn(&mut WaitQueue, Ticket, Role) -> Result<(), UsageError>,
    ) -> Result<(), UsageError> {
        let mut queue = self.state.lock();
        release(&mut *queue, ticket, role).inspect_err(|err| self.log_misuse(err))?;
        let remaining = queue.len();
        drop(queue);
        self.turn.notify_all();
        debug!(lock = self.config.name, %ticket, role = role.name(), remaining, "released");
        Ok(())
    }

    /// Issues a guard-owned ticket and waits for its turn.
    ///
    /// # Panics
    ///
    /// Panics if the ticket leaves the queue without being granted. Callers
    /// cannot release or abandon guard-owned tickets, so this means the queue
    /// state is corrupt and handing out a guard would break exclusion.
    fn enter(&self, role: Role) -> Ticket {
        let mut queue = self.state.lock();
        let ticket = queue.issue_guarded(Instant::now(), role);
        let turn = self.wait_turn(&mut queue, ticket, role, None);
        drop(queue);
        assert!(matches!(turn, Turn::Granted(_)), "guard ticket {ticket} lost: {turn:?}");
        debug!(lock = self.config.name, %ticket, role = role.name(), "guard acquired");
        ticket
    }

    fn enter_until(&self, role: Role, deadline: Option<Instant>) -> Result<Ticket, TryAcquireError> {
        let mut queue = self.state.lock();
        let ticket = queue.issue_guarded(Instant::now(), role);
        match self.wait_turn(&mut queue, ticket, role, deadline) {
            Turn::Granted(_) => Ok(ticket),
            Turn::TimedOut(waited) => {
                let _ = queue.withdraw_guarded(ticket);
                queue.record_timeout();
                drop(queue);
                self.turn.notify_all();
                debug!(lock = self.config.name, %ticket, role = role.name(), ?waited, "guard timed out");
                Err(TryAcquireError::TimedOut { waited })
            }
            Turn::Withdrawn => {
                drop(queue);
                panic!("guard ticket {ticket} withdrawn while waiting");
            }
        }
    }

    fn try_enter(&self, role: Role) -> Result<Ticket, TryAcquireError> {
        let mut queue = self.state.lock();
        let ticket = queue.issue_guarded(Instant::now(), role);
        if queue.is_eligible(ticket.position(), role) {
            queue.grant(ticket.position(), role);
            return Ok(ticket);
        }
        // Registered and withdrawn under one mutex hold; no waiter saw it.
        let _ = queue.withdraw_guarded(ticket);
        Err(TryAcquireError::WouldBlock)
    }

    #[cfg_attr(not(feature = "tracing-integration"), allow(unused_variables))]
    fn log_stall(&self, queue: &WaitQueue, ticket: Ticket, role: Role, waited: Duration) {
        let oldest = queue.oldest_pending().map(|(oldest, _)| oldest);
        warn!(
            lock = self.config.name,
            %ticket,
            role = role.name(),
            ?waited,
            oldest_pending = ?oldest,
            queue_len = queue.len(),
            "ticket waiting past stall threshold"
        );
    }

    #[cfg_attr(not(feature = "tracing-integration"), allow(unused_variables))]
    fn log_misuse(&self, err: &UsageError) {
        error!(lock = self.config.name, error = %err, "ticket lock misuse");
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
