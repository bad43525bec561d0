use async_trait::async_trait;
use authnz_core::AuthnzResult;
use serde::{Deserialize, Serialize};

/// The subset of an OpenID Provider configuration document used by the flows.
///
/// Every field is optional so partial documents still parse; completeness is
/// checked when a [`ProviderConfig`](crate::ProviderConfig) is resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer identifier.
    #[serde(default)]
    pub issuer: Option<String>,
    /// URL of the authorization endpoint.
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// URL of the token endpoint.
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// URL of the userinfo endpoint.
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// URL of the JSON Web Key Set.
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// URL of the end session endpoint.
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    /// Supported scopes.
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

/// Fetches an OpenID Provider configuration document.
#[async_trait]
pub trait DiscoveryFetch: Send + Sync {
    /// GET the document at `uri`. Transport and parse failures are configuration errors.
    async fn fetch_discovery(&self, uri: &str) -> AuthnzResult<ProviderMetadata>;
}
