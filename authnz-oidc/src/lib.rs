//! # Authnz OIDC
//!
//! `authnz-oidc` implements the OpenID Connect authorization code flow on top of
//! `authnz-core`: it builds authorization URLs, completes callbacks, maps userinfo
//! claims to local users, persists provider tokens and disconnects providers.
//!
//! ## Key Components
//!
//! - **[`ProviderConfig`]**: Resolved endpoints, credentials and claim mapping of one provider.
//! - **[`OidcAuthnz`]**: The authorization, callback, disconnect and refresh flows.
//! - **[`AuthnzManager`]**: Registry dispatching flows by provider name.
//! - **[`HttpClient`]**: `reqwest` implementation of the discovery, token and userinfo ports.

#![warn(missing_docs)]

/// HTTP ports and their `reqwest` implementation.
pub mod client;
/// Provider settings and resolved provider configuration.
pub mod config;
/// OpenID Provider metadata discovery.
pub mod discovery;
/// The authorization, callback, disconnect and refresh flows.
pub mod flow;
/// Identity token payload decoding.
pub mod id_token;
/// Claim extraction and local user resolution.
pub mod identity;
/// Multi-provider registry.
pub mod manager;
/// External token record bookkeeping.
pub mod persistence;

pub use client::{HttpClient, OAuth2Session, TokenExchange, UserInfoFetch};
pub use config::{
    BackendSettings, ClaimKind, ClaimMappings, EndpointKind, OidcSettings, ProviderConfig,
};
pub use discovery::{DiscoveryFetch, ProviderMetadata};
pub use flow::OidcAuthnz;
pub use manager::{AuthnzManager, AuthnzManagerBuilder};
