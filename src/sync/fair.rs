//! A data-carrying fair reader/writer lock.
//!
//! [`FairRwLock<T>`] pairs a [`TicketRwLock`] with the value it protects. The
//! ticket lock decides who goes next; the value itself sits in a
//! `std::sync::RwLock` that is only ever taken by a request the ticket lock
//! has already admitted, so it never blocks.
//!
//! # Poisoning
//!
//! A panic while a guard is held poisons the lock. Later acquisitions return
//! [`LockError::Poisoned`]; `get_mut` and `into_inner` still hand out the
//! value.
//!
//! # Example
//!
//! ```
//! use ticketrw::FairRwLock;
//!
//! let lock = FairRwLock::new(vec![1, 2, 3]);
//! {
//!     let a = lock.read()?;
//!     let b = lock.read()?;
//!     assert_eq!(a.len(), b.len());
//! }
//! lock.write()?.push(4);
//! assert_eq!(lock.into_inner(), vec![1, 2, 3, 4]);
//! # Ok::<(), ticketrw::LockError>(())
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock as StdRwLock};
use std::time::Duration;

use super::guard::{ReadGuard, WriteGuard};
use super::rwlock::TicketRwLock;
use crate::config::{ConfigError, LockConfig};
use crate::error::{LockError, TryAcquireError, TryLockError};

/// A reader/writer lock over `T` with FIFO fairness across readers and writers.
#[derive(Debug)]
pub struct FairRwLock<T> {
    order: TicketRwLock,
    data: StdRwLock<T>,
    poisoned: AtomicBool,
}

impl<T: Default> Default for FairRwLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> FairRwLock<T> {
    /// Creates a new lock containing `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            order: TicketRwLock::new(),
            data: StdRwLock::new(value),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Creates a new lock with the given configuration.
    pub fn with_config(value: T, config: LockConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            order: TicketRwLock::with_config(config)?,
            data: StdRwLock::new(value),
            poisoned: AtomicBool::new(false),
        })
    }

    /// The ticket lock that orders access, for diagnostics.
    #[must_use]
    pub const fn ticket_lock(&self) -> &TicketRwLock {
        &self.order
    }

    /// Returns true if the lock is poisoned.
    #[inline]
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Waits for a turn to read.
    pub fn read(&self) -> Result<FairReadGuard<'_, T>, LockError> {
        if self.is_poisoned() {
            return Err(LockError::Poisoned);
        }
        self.admit_read(self.order.read_guard())
    }

    /// Waits for a turn to write.
    pub fn write(&self) -> Result<FairWriteGuard<'_, T>, LockError> {
        if self.is_poisoned() {
            return Err(LockError::Poisoned);
        }
        self.admit_write(self.order.write_guard())
    }

    /// Reads if no earlier writer is queued or holding.
    pub fn try_read(&self) -> Result<FairReadGuard<'_, T>, TryLockError> {
        if self.is_poisoned() {
            return Err(TryLockError::Poisoned);
        }
        let turn = self.order.try_read().map_err(|_| TryLockError::Locked)?;
        self.admit_read(turn).map_err(|_| TryLockError::Poisoned)
    }

    /// Writes if nobody is queued or holding.
    pub fn try_write(&self) -> Result<FairWriteGuard<'_, T>, TryLockError> {
        if self.is_poisoned() {
            return Err(TryLockError::Poisoned);
        }
        let turn = self.order.try_write().map_err(|_| TryLockError::Locked)?;
        self.admit_write(turn).map_err(|_| TryLockError::Poisoned)
    }

    /// [`read`](Self::read) that gives up after `timeout`.
    pub fn read_timeout(&self, timeout: Duration) -> Result<FairReadGuard<'_, T>, LockError> {
        if self.is_poisoned() {
            return Err(LockError::Poisoned);
        }
        let turn = self
            .order
            .read_guard_timeout(timeout)
            .map_err(timed_out)?;
        self.admit_read(turn)
    }

    /// [`write`](Self::write) that gives up after `timeout`.
    pub fn write_timeout(&self, timeout: Duration) -> Result<FairWriteGuard<'_, T>, LockError> {
        if self.is_poisoned() {
            return Err(LockError::Poisoned);
        }
        let turn = self
            .order
            .write_guard_timeout(timeout)
            .map_err(timed_out)?;
        self.admit_write(turn)
    }

    /// Returns a mutable reference to the value. No locking is needed since
    /// the borrow is exclusive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consumes the lock and returns the value.
    pub fn into_inner(self) -> T {
        self.data.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit_read<'a>(&'a self, turn: ReadGuard<'a>) -> Result<FairReadGuard<'a, T>, LockError> {
        match self.data.read() {
            Ok(data) => Ok(FairReadGuard {
                lock: self,
                data: Some(data),
                _turn: turn,
            }),
            Err(poisoned) => {
                self.poisoned.store(true, Ordering::Release);
                drop(poisoned.into_inner());
                // `turn` drops here and releases the ticket.
                Err(LockError::Poisoned)
            }
        }
    }

    fn admit_write<'a>(&'a self, turn: WriteGuard<'a>) -> Result<FairWriteGuard<'a, T>, LockError> {
        match self.data.write() {
            Ok(data) => Ok(FairWriteGuard {
                lock: self,
                data: Some(data),
                _turn: turn,
            }),
            Err(poisoned) => {
                self.poisoned.store(true, Ordering::Release);
                drop(poisoned.into_inner());
                Err(LockError::Poisoned)
            }
        }
    }
}

fn timed_out(err: TryAcquireError) -> LockError {
    match err {
        TryAcquireError::TimedOut { waited } => LockError::TimedOut { waited },
        TryAcquireError::WouldBlock => LockError::TimedOut {
            waited: Duration::ZERO,
        },
    }
}

/// Shared access to the value of a [`FairRwLock`].
#[must_use = "guard will be immediately released if not held"]
pub struct FairReadGuard<'a, T> {
    lock: &'a FairRwLock<T>,
    data: Option<std::sync::RwLockReadGuard<'a, T>>,
    _turn: ReadGuard<'a>,
}

impl<T> Deref for FairReadGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.data.as_deref().expect("guard accessed after drop")
    }
}

impl<T> Drop for FairReadGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        // Drop the data guard BEFORE the ticket is released (the `_turn`
        // field drops after this body), otherwise the next holder would block
        // on the inner lock.
        drop(self.data.take());
    }
}

/// Exclusive access to the value of a [`FairRwLock`].
#[must_use = "guard will be immediately released if not held"]
pub struct FairWriteGuard<'a, T> {
    lock: &'a FairRwLock<T>,
    data: Option<std::sync::RwLockWriteGuard<'a, T>>,
    _turn: WriteGuard<'a>,
}

impl<T> Deref for FairWriteGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.data.as_deref().expect("guard accessed after drop")
    }
}

impl<T> DerefMut for FairWriteGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data.as_deref_mut().expect("guard accessed after drop")
    }
}

impl<T> Drop for FairWriteGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.lock.poisoned.store(true, Ordering::Release);
        }
        drop(self.data.take());
    }
}
