//! Implementations of [`authnz_core::AuthnzStore`].
//!
//! [`MemoryStore`] is always available. The SQL store is enabled with the
//! `sqlite` or `postgres` feature.

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "store-sqlx")]
pub mod sql_store;
#[cfg(feature = "store-sqlx")]
pub use sql_store::SqlStore;

pub use authnz_core::{AuthnzStore, Change};
