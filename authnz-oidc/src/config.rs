use crate::discovery::DiscoveryFetch;
use authnz_core::{AuthnzError, AuthnzResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Scopes requested from every provider.
pub const DEFAULT_SCOPES: [&str; 3] = ["openid", "email", "profile"];

/// Parameters set by the authorization flow itself. Extra parameters may not override them.
pub(crate) const RESERVED_PARAMS: [&str; 6] = [
    "client_id",
    "redirect_uri",
    "response_type",
    "scope",
    "state",
    "nonce",
];

/// Settings shared by every provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcSettings {
    /// Whether TLS certificates of the provider are verified.
    #[serde(alias = "VERIFY_SSL")]
    pub verify_ssl: bool,
    /// Timeout applied to each discovery, token and userinfo request, in seconds.
    pub http_timeout_secs: u64,
}

impl Default for OidcSettings {
    fn default() -> Self {
        Self {
            verify_ssl: true,
            http_timeout_secs: 30,
        }
    }
}

impl OidcSettings {
    /// The per-request HTTP timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Whether certificates of `backend` are verified, honouring its override.
    pub fn verify_ssl_for(&self, backend: &BackendSettings) -> bool {
        backend.verify_ssl.unwrap_or(self.verify_ssl)
    }
}

/// The userinfo claims a local identity is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimKind {
    /// The user's email address.
    Email,
    /// The user's public name.
    Username,
    /// The provider's subject identifier.
    Id,
}

impl ClaimKind {
    /// The standard claim name for this kind.
    pub fn default_name(self) -> &'static str {
        match self {
            ClaimKind::Email => "email",
            ClaimKind::Username => "preferred_username",
            ClaimKind::Id => "sub",
        }
    }
}

/// Per-provider overrides of the claim names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimMappings {
    /// Claim holding the email address.
    pub email: Option<String>,
    /// Claim holding the user name.
    pub username: Option<String>,
    /// Claim holding the subject identifier.
    pub id: Option<String>,
}

impl ClaimMappings {
    /// The effective claim name for `kind`.
    pub fn claim_name(&self, kind: ClaimKind) -> &str {
        let configured = match kind {
            ClaimKind::Email => &self.email,
            ClaimKind::Username => &self.username,
            ClaimKind::Id => &self.id,
        };
        configured.as_deref().unwrap_or(kind.default_name())
    }
}

/// Raw configuration of one provider backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    /// OAuth2 client identifier.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    /// Location of the provider's discovery document.
    #[serde(default, alias = "well_known_oidc_config_uri")]
    pub well_known_config_uri: Option<String>,
    /// Authorization endpoint, required without a discovery document.
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// Token endpoint, required without a discovery document.
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// Userinfo endpoint, required without a discovery document.
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// Additional authorization request parameters.
    #[serde(default)]
    pub extra_params: BTreeMap<String, String>,
    /// Claim name overrides.
    #[serde(default, alias = "userinfo_claim_mappings")]
    pub claim_mappings: ClaimMappings,
    /// Overrides [`OidcSettings::verify_ssl`] for this provider.
    #[serde(default, alias = "VERIFY_SSL")]
    pub verify_ssl: Option<bool>,
}

/// Endpoints of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Where the browser is sent to log in.
    Authorization,
    /// Where codes and refresh tokens are exchanged.
    Token,
    /// Where claims about the user are fetched.
    UserInfo,
}

impl EndpointKind {
    fn key(self) -> &'static str {
        match self {
            EndpointKind::Authorization => "authorization_endpoint",
            EndpointKind::Token => "token_endpoint",
            EndpointKind::UserInfo => "userinfo_endpoint",
        }
    }
}

/// Fully resolved configuration of one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    provider: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorization_endpoint: Url,
    token_endpoint: Url,
    userinfo_endpoint: Url,
    verify_ssl: bool,
    extra_params: BTreeMap<String, String>,
    claim_mappings: ClaimMappings,
    scopes: Vec<String>,
}

impl ProviderConfig {
    /// Resolve a provider, fetching its discovery document once when one is configured.
    ///
    /// Endpoints given directly in `backend` take precedence over discovered ones.
    pub async fn resolve(
        provider_name: &str,
        settings: &OidcSettings,
        mut backend: BackendSettings,
        discovery: &dyn DiscoveryFetch,
    ) -> AuthnzResult<Self> {
        if let Some(uri) = backend.well_known_config_uri.clone() {
            log::debug!("Fetching OIDC discovery document for '{provider_name}' from {uri}");
            let metadata = discovery.fetch_discovery(&uri).await?;
            backend.authorization_endpoint =
                backend.authorization_endpoint.or(metadata.authorization_endpoint);
            backend.token_endpoint = backend.token_endpoint.or(metadata.token_endpoint);
            backend.userinfo_endpoint = backend.userinfo_endpoint.or(metadata.userinfo_endpoint);
        }
        Self::from_settings(provider_name, settings, backend)
    }

    /// Build a provider whose endpoints are all configured directly.
    pub fn from_settings(
        provider_name: &str,
        settings: &OidcSettings,
        backend: BackendSettings,
    ) -> AuthnzResult<Self> {
        let provider = provider_name.to_lowercase();
        if provider.is_empty() {
            return Err(AuthnzError::Configuration(
                "Provider name must not be empty".to_string(),
            ));
        }
        for (field, value) in [
            ("client_id", &backend.client_id),
            ("client_secret", &backend.client_secret),
            ("redirect_uri", &backend.redirect_uri),
        ] {
            if value.is_empty() {
                return Err(AuthnzError::Configuration(format!(
                    "Provider '{provider}' is missing '{field}'"
                )));
            }
        }

        let endpoint = |kind: EndpointKind, value: Option<String>| -> AuthnzResult<Url> {
            let value = value.ok_or_else(|| {
                AuthnzError::Configuration(format!(
                    "Provider '{provider}' has no '{}'; configure it or a well-known config uri",
                    kind.key()
                ))
            })?;
            Url::parse(&value).map_err(|e| {
                AuthnzError::Configuration(format!(
                    "Provider '{provider}' has an invalid '{}' ({value}): {e}",
                    kind.key()
                ))
            })
        };
        let verify_ssl = settings.verify_ssl_for(&backend);
        let authorization_endpoint =
            endpoint(EndpointKind::Authorization, backend.authorization_endpoint)?;
        let token_endpoint = endpoint(EndpointKind::Token, backend.token_endpoint)?;
        let userinfo_endpoint = endpoint(EndpointKind::UserInfo, backend.userinfo_endpoint)?;

        Ok(Self {
            provider,
            client_id: backend.client_id,
            client_secret: backend.client_secret,
            redirect_uri: backend.redirect_uri,
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint,
            verify_ssl,
            extra_params: backend.extra_params,
            claim_mappings: backend.claim_mappings,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Lower-cased provider name.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// OAuth2 client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth2 client secret.
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Registered callback URL.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// A resolved endpoint.
    pub fn endpoint(&self, kind: EndpointKind) -> &Url {
        match kind {
            EndpointKind::Authorization => &self.authorization_endpoint,
            EndpointKind::Token => &self.token_endpoint,
            EndpointKind::UserInfo => &self.userinfo_endpoint,
        }
    }

    /// Whether provider certificates are verified. Selects the HTTP client the flow uses.
    pub fn verify_ssl(&self) -> bool {
        self.verify_ssl
    }

    /// Additional authorization request parameters.
    pub fn extra_params(&self) -> &BTreeMap<String, String> {
        &self.extra_params
    }

    /// Claim name overrides.
    pub fn claim_mappings(&self) -> &ClaimMappings {
        &self.claim_mappings
    }

    /// The space separated scope parameter.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }
}
