//! Transaction management.
//!
//! A [`SharedGroup`] is one handle onto a database file. It runs at most one
//! transaction at a time, following this state machine:
//!
//! ```text
//!            begin_read            end_read
//!   Idle ─────────────────> ReadActive ─────────> Idle
//!   Idle ─────────────────> WriteActive ───────> Idle      (commit | rollback)
//!            begin_write
//!
//!   Idle ──begin_implicit_transaction──> ImplicitReadActive ──advance_read──┐
//!                                            │     ^    ^                   │
//!                               promote_to_write   │    └───────────────────┘
//!                                            v     │ commit_and_continue_as_read
//!                                     ImplicitWriteActive  rollback_and_continue_as_read
//! ```
//!
//! `end_read` also ends an implicit read and `rollback` an implicit write,
//! returning the handle to `Idle`.
//!
//! ## Single-Writer Guarantee
//!
//! All handles on one file share its write lock. `begin_write` blocks until
//! the lock is free; `try_begin_write` and `promote_to_write` fail with
//! `IllegalState` instead of waiting.

mod guards;
mod manager;
mod session;
mod state;

pub use guards::{ReadTransaction, WriteTransaction};
pub use manager::SharedGroup;
pub(crate) use session::Session;
pub(crate) use state::SessionState;

/// Identifies a listener registered with [`SharedGroup::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);
