use crate::config::{EndpointKind, OidcSettings, ProviderConfig};
use crate::discovery::{DiscoveryFetch, ProviderMetadata};
use async_trait::async_trait;
use authnz_core::{AuthnzError, AuthnzResult, Claims};
use serde_json::Value;

/// The client side of one token exchange, bound to the state it was started with.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuth2Session {
    /// The state this exchange is bound to.
    pub state: String,
    /// Raw token response, once the code has been exchanged.
    pub token: Option<Value>,
}

impl OAuth2Session {
    /// Start a session for `state`.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            token: None,
        }
    }

    /// Access token of the exchanged token response.
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_ref()?.get("access_token")?.as_str()
    }
}

/// Exchanges grants at a provider's token endpoint.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange an authorization code. On success the raw response is also stored on `session`.
    async fn fetch_token(
        &self,
        config: &ProviderConfig,
        session: &mut OAuth2Session,
        code: &str,
    ) -> AuthnzResult<Value>;

    /// Exchange a refresh token for a new token response.
    async fn refresh_token(&self, config: &ProviderConfig, refresh_token: &str)
        -> AuthnzResult<Value>;
}

/// Fetches claims from a provider's userinfo endpoint.
#[async_trait]
pub trait UserInfoFetch: Send + Sync {
    /// Fetch the claims of the user `session` was issued for.
    async fn fetch_userinfo(
        &self,
        config: &ProviderConfig,
        session: &OAuth2Session,
    ) -> AuthnzResult<Claims>;
}

/// `reqwest` implementation of the discovery, token and userinfo ports.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http_client: reqwest::Client,
}

impl HttpClient {
    /// Build a client honouring the TLS verification and timeout settings.
    pub fn new(settings: &OidcSettings) -> AuthnzResult<Self> {
        Self::with_tls_verification(settings, settings.verify_ssl)
    }

    /// Build a client with the shared timeout and an explicit TLS verification flag.
    pub fn with_tls_verification(settings: &OidcSettings, verify_ssl: bool) -> AuthnzResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| AuthnzError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    /// Wrap an existing `reqwest` client.
    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn post_token_form(
        &self,
        config: &ProviderConfig,
        form: &[(&str, &str)],
    ) -> AuthnzResult<Value> {
        let endpoint = config.endpoint(EndpointKind::Token).clone();
        let response = self
            .http_client
            .post(endpoint)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| AuthnzError::TokenExchange(describe("token endpoint", &e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthnzError::TokenExchange(format!(
                "Token endpoint of '{}' returned {status}: {body}",
                config.provider()
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AuthnzError::TokenExchange(format!("Invalid token response: {e}")))?;
        if !raw.is_object() {
            return Err(AuthnzError::TokenExchange(
                "Token response is not a JSON object".to_string(),
            ));
        }
        Ok(raw)
    }
}

fn describe(target: &str, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("Request to {target} timed out")
    } else {
        format!("Request to {target} failed: {err}")
    }
}

#[async_trait]
impl DiscoveryFetch for HttpClient {
    async fn fetch_discovery(&self, uri: &str) -> AuthnzResult<ProviderMetadata> {
        let response = self
            .http_client
            .get(uri)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthnzError::Configuration(describe("discovery document", &e)))?;

        response
            .json::<ProviderMetadata>()
            .await
            .map_err(|e| AuthnzError::Configuration(format!("Invalid discovery document: {e}")))
    }
}

#[async_trait]
impl TokenExchange for HttpClient {
    async fn fetch_token(
        &self,
        config: &ProviderConfig,
        session: &mut OAuth2Session,
        code: &str,
    ) -> AuthnzResult<Value> {
        let raw = self
            .post_token_form(
                config,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", config.redirect_uri()),
                    ("client_id", config.client_id()),
                    ("client_secret", config.client_secret()),
                ],
            )
            .await?;
        session.token = Some(raw.clone());
        Ok(raw)
    }

    async fn refresh_token(
        &self,
        config: &ProviderConfig,
        refresh_token: &str,
    ) -> AuthnzResult<Value> {
        self.post_token_form(
            config,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", config.client_id()),
                ("client_secret", config.client_secret()),
            ],
        )
        .await
    }
}

#[async_trait]
impl UserInfoFetch for HttpClient {
    async fn fetch_userinfo(
        &self,
        config: &ProviderConfig,
        session: &OAuth2Session,
    ) -> AuthnzResult<Claims> {
        let access_token = session.access_token().ok_or_else(|| {
            AuthnzError::UserInfoFetch("Session holds no access token".to_string())
        })?;

        let response = self
            .http_client
            .get(config.endpoint(EndpointKind::UserInfo).clone())
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthnzError::UserInfoFetch(describe("userinfo endpoint", &e)))?;

        response
            .json::<Claims>()
            .await
            .map_err(|e| AuthnzError::UserInfoFetch(format!("Invalid userinfo response: {e}")))
    }
}
