//! # Authnz
//!
//! OpenID Connect authentication core. This crate re-exports the workspace
//! crates behind cargo features:
//!
//! - `oidc` (default): provider configuration and the login, callback,
//!   disconnect and refresh flows.
//! - `store` (default): the in-memory store.
//! - `sqlite`, `postgres`: the SQL store for the given backend.

pub use authnz_core::*;

#[cfg(feature = "oidc")]
pub use authnz_oidc as oidc;
#[cfg(feature = "oidc")]
pub use authnz_oidc::{
    AuthnzManager, BackendSettings, ClaimMappings, HttpClient, OidcAuthnz, OidcSettings,
    ProviderConfig,
};

#[cfg(feature = "store")]
pub use authnz_store as stores;
#[cfg(feature = "store")]
pub use authnz_store::MemoryStore;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use authnz_store::SqlStore;
