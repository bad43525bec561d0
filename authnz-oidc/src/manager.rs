use crate::client::HttpClient;
use crate::config::{BackendSettings, OidcSettings, ProviderConfig};
use crate::flow::OidcAuthnz;
use authnz_core::{AuthnzContext, AuthnzError, AuthnzResult, DisconnectOutcome, LocalUser};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Dispatches authentication flows by provider name.
#[derive(Clone, Default)]
pub struct AuthnzManager {
    providers: HashMap<String, Arc<OidcAuthnz>>,
}

impl AuthnzManager {
    /// Create a new [`AuthnzManagerBuilder`].
    pub fn builder() -> AuthnzManagerBuilder {
        AuthnzManagerBuilder::default()
    }

    /// Resolve every configured backend.
    ///
    /// Providers share one HTTP client unless they override TLS verification.
    /// Names that collide once lower-cased are rejected.
    pub async fn from_settings(
        settings: &OidcSettings,
        backends: BTreeMap<String, BackendSettings>,
    ) -> AuthnzResult<Self> {
        let shared = HttpClient::new(settings)?;
        let client_for = |verify_ssl: bool| {
            if verify_ssl == settings.verify_ssl {
                Ok(shared.clone())
            } else {
                HttpClient::with_tls_verification(settings, verify_ssl)
            }
        };

        let mut seen = HashSet::new();
        let mut builder = Self::builder();
        for (name, backend) in backends {
            if !seen.insert(name.to_lowercase()) {
                return Err(AuthnzError::Configuration(format!(
                    "Provider '{name}' is configured more than once"
                )));
            }
            let discovery = client_for(settings.verify_ssl_for(&backend))?;
            let config = ProviderConfig::resolve(&name, settings, backend, &discovery).await?;
            let client = client_for(config.verify_ssl())?;
            builder = builder.provider(OidcAuthnz::new(config, client));
        }
        Ok(builder.build())
    }

    /// The flow registered for `provider_name`, matched case-insensitively.
    pub fn provider(&self, provider_name: &str) -> AuthnzResult<&OidcAuthnz> {
        self.providers
            .get(&provider_name.to_lowercase())
            .map(|flow| &**flow)
            .ok_or_else(|| AuthnzError::UnknownProvider(provider_name.to_string()))
    }

    /// Names of all registered providers.
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// See [`OidcAuthnz::authenticate`].
    pub fn authenticate(
        &self,
        provider_name: &str,
        ctx: &mut AuthnzContext<'_>,
    ) -> AuthnzResult<String> {
        Ok(self.provider(provider_name)?.authenticate(ctx))
    }

    /// See [`OidcAuthnz::callback`].
    pub async fn callback(
        &self,
        provider_name: &str,
        state_token: Option<&str>,
        code: &str,
        ctx: &mut AuthnzContext<'_>,
        login_redirect_url: &str,
    ) -> AuthnzResult<(String, LocalUser)> {
        self.provider(provider_name)?
            .callback(state_token, code, ctx, login_redirect_url)
            .await
    }

    /// See [`OidcAuthnz::disconnect`].
    pub async fn disconnect(
        &self,
        provider_name: &str,
        ctx: &mut AuthnzContext<'_>,
        post_disconnect_redirect: &str,
    ) -> AuthnzResult<DisconnectOutcome> {
        self.provider(provider_name)?
            .disconnect(provider_name, ctx, post_disconnect_redirect)
            .await
    }
}

/// A builder for configuring and creating an [`AuthnzManager`].
#[derive(Default)]
pub struct AuthnzManagerBuilder {
    providers: HashMap<String, Arc<OidcAuthnz>>,
}

impl AuthnzManagerBuilder {
    /// Register a provider flow under its configured name.
    pub fn provider(mut self, flow: OidcAuthnz) -> Self {
        let name = flow.config().provider().to_string();
        self.providers.insert(name, Arc::new(flow));
        self
    }

    /// Build the [`AuthnzManager`] instance.
    pub fn build(self) -> AuthnzManager {
        AuthnzManager {
            providers: self.providers,
        }
    }
}
