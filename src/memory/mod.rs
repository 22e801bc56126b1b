//! In-memory implementations of the identity provider and document store.
//!
//! They back the command line client and the tests, and support injecting
//! failures such as going offline.

mod identity;
mod store;

pub use identity::{InMemoryIdentityProvider, SentEmail};
pub use store::InMemoryStore;
