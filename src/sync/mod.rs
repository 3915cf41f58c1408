//! Ticket-ordered synchronization primitives.
//!
//! # Primitives
//!
//! - [`TicketRwLock`]: the fair reader/writer lock, driven either by explicit
//!   tickets or by scoped guards
//! - [`FairRwLock`]: a value protected by a [`TicketRwLock`]
//!
//! # Two-Phase Pattern
//!
//! Every acquisition is split the same way:
//!
//! - **Phase 1 (Queue)**: take a [`Ticket`]. Its position fixes the order in
//!   which conflicting requests will be served.
//! - **Phase 2 (Hold)**: acquire with a role, work, release with the same
//!   role. Guards do all three and release on drop.

mod fair;
mod guard;
mod queue;
mod rwlock;
mod stats;
mod ticket;

pub use fair::{FairReadGuard, FairRwLock, FairWriteGuard};
pub use guard::{OwnedReadGuard, OwnedWriteGuard, ReadGuard, WriteGuard};
pub use rwlock::TicketRwLock;
pub use stats::{LockStats, TicketSnapshot};
pub use ticket::{LockId, Role, Ticket, TicketState};
