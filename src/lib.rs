//! Fair, ticket-ordered reader/writer locking.
//!
//! `ticketrw` provides a reader/writer lock in which every request takes a
//! ticket and conflicting requests are served strictly in ticket order:
//!
//! - any number of readers may hold together while no writer holds
//! - a writer holds alone
//! - no request is ever passed by a later conflicting one, so neither readers
//!   nor writers starve
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//! use ticketrw::TicketRwLock;
//!
//! let lock = Arc::new(TicketRwLock::new());
//! let workers: Vec<_> = (0..4)
//!     .map(|_| {
//!         let lock = Arc::clone(&lock);
//!         thread::spawn(move || {
//!             let _shared = lock.read_guard();
//!         })
//!     })
//!     .collect();
//! for worker in workers {
//!     worker.join().unwrap();
//! }
//! assert!(lock.stats().is_idle());
//! ```
//!
//! # Features
//!
//! - `tracing-integration` (default): structured log events through `tracing`
//! - `serde`: `Serialize` for the diagnostics types

pub mod config;
pub mod error;
pub mod sync;
mod tracing_compat;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ConfigError, LockConfig};
pub use error::{AcquireError, LockError, TryAcquireError, TryLockError, UsageError};
pub use sync::{
    FairReadGuard, FairRwLock, FairWriteGuard, LockId, LockStats, OwnedReadGuard,
    OwnedWriteGuard, ReadGuard, Role, Ticket, TicketRwLock, TicketSnapshot, TicketState,
    WriteGuard,
};
