//! The core of a personal expense tracker.
//!
//! A user signs up with an email address, verifies it, and then records dated,
//! categorized expenses, sets a monthly spending budget and views totals.
//! Accounts are owned by an external [IdentityProvider] and records live in a
//! remote [DocumentStore] that pushes live snapshots to subscribers.
//!
//! [ExpenseTracker] reconciles the three things that change underneath a
//! client: who is signed in, the latest snapshot of their records, and the
//! filter and sort order they picked. The [view] functions that derive what is
//! shown are pure.
//!
//! The [memory] module provides in-memory collaborators for the command line
//! client and for tests.

#![warn(missing_docs)]

pub mod alert;
pub mod budget;
pub mod category;
pub mod config;
pub mod display;
mod error;
pub mod expense;
pub mod export;
pub mod feed;
pub mod identity;
pub mod memory;
pub mod password;
pub mod pending;
pub mod period;
pub mod session;
pub mod store;
pub mod timezone;
pub mod tracker;
pub mod view;

pub use alert::{Alert, AlertType};
pub use category::Category;
pub use config::TrackerConfig;
pub use error::{Error, ValidationError};
pub use expense::{Expense, ExpenseForm, ExpenseId, NewExpense};
pub use identity::{AuthError, Identity, IdentityProvider, UserID};
pub use period::Period;
pub use session::SessionState;
pub use store::{DocumentStore, StoreError};
pub use tracker::{AddedExpense, ExpenseTracker};
