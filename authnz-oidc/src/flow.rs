use crate::client::{HttpClient, OAuth2Session, TokenExchange, UserInfoFetch};
use crate::config::{EndpointKind, ProviderConfig, RESERVED_PARAMS};
use crate::id_token;
use crate::identity::{extract_identity, resolve_user};
use crate::persistence::{stage_token, ExchangedTokens};
use authnz_core::cookies::take_cookie;
use authnz_core::nonce::{generate_nonce, generate_state, hash_nonce, verify_nonce};
use authnz_core::{
    AuthnzContext, AuthnzError, AuthnzResult, AuthnzStore, CookieConfig, DisconnectError,
    DisconnectOutcome, ExternalToken, LocalUser, NONCE_COOKIE_NAME, STATE_COOKIE_NAME,
};
use chrono::Utc;
use std::sync::Arc;

/// The OpenID Connect authorization code flow for one provider.
#[derive(Clone)]
pub struct OidcAuthnz {
    config: ProviderConfig,
    cookie_config: CookieConfig,
    token_exchange: Arc<dyn TokenExchange>,
    userinfo: Arc<dyn UserInfoFetch>,
}

impl OidcAuthnz {
    /// Create a flow talking to the provider over `client`.
    pub fn new(config: ProviderConfig, client: HttpClient) -> Self {
        let client = Arc::new(client);
        Self::with_ports(config, client.clone(), client)
    }

    /// Create a flow with custom token exchange and userinfo implementations.
    pub fn with_ports(
        config: ProviderConfig,
        token_exchange: Arc<dyn TokenExchange>,
        userinfo: Arc<dyn UserInfoFetch>,
    ) -> Self {
        Self {
            config,
            cookie_config: CookieConfig::default(),
            token_exchange,
            userinfo,
        }
    }

    /// Override the attributes of the state and nonce cookies.
    pub fn with_cookie_config(mut self, cookie_config: CookieConfig) -> Self {
        self.cookie_config = cookie_config;
        self
    }

    /// The provider this flow authenticates against.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Start a login: set fresh state and nonce cookies and return the URL to send the browser to.
    pub fn authenticate(&self, ctx: &mut AuthnzContext<'_>) -> String {
        let state = generate_state();
        let nonce = generate_nonce();
        let nonce_hash = hash_nonce(&nonce);

        let mut url = self.config.endpoint(EndpointKind::Authorization).clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", self.config.client_id())
                .append_pair("redirect_uri", self.config.redirect_uri())
                .append_pair("response_type", "code")
                .append_pair("scope", &self.config.scope())
                .append_pair("state", &state)
                .append_pair("nonce", &nonce_hash);

            for (key, value) in self.config.extra_params() {
                if RESERVED_PARAMS.contains(&key.as_str()) {
                    log::warn!(
                        "Ignoring extra parameter '{key}' for '{}': it is set by the flow",
                        self.config.provider()
                    );
                    continue;
                }
                query.append_pair(key, value);
            }
        }

        ctx.cookies.add(
            self.cookie_config
                .build_cookie(STATE_COOKIE_NAME, state, ctx.secure),
        );
        ctx.cookies.add(
            self.cookie_config
                .build_cookie(NONCE_COOKIE_NAME, nonce, ctx.secure),
        );

        log::debug!(
            "Built authorization URL for '{}': {url}",
            self.config.provider()
        );
        url.to_string()
    }

    /// Complete a login from the provider's redirect.
    ///
    /// The state cookie is preferred over `state_token`, which may come from an
    /// untrusted query string. Both flow cookies are consumed. Nothing is
    /// written to the store unless every check passes, and the store is flushed
    /// exactly once. `login_redirect_url` is returned unchanged.
    pub async fn callback(
        &self,
        state_token: Option<&str>,
        code: &str,
        ctx: &mut AuthnzContext<'_>,
        login_redirect_url: &str,
    ) -> AuthnzResult<(String, LocalUser)> {
        let provider = self.config.provider();
        let cookie_state = take_cookie(ctx.cookies, STATE_COOKIE_NAME, &self.cookie_config);
        let cookie_nonce = take_cookie(ctx.cookies, NONCE_COOKIE_NAME, &self.cookie_config);

        let state = match (cookie_state, state_token.filter(|s| !s.is_empty())) {
            (Some(state), Some(param)) if state != param => {
                log::warn!("State parameter for '{provider}' differs from the state cookie; using the cookie");
                state
            }
            (Some(state), _) => state,
            (None, Some(param)) => param.to_string(),
            (None, None) => {
                return Err(AuthnzError::StateMismatch(
                    "no state cookie or state parameter".to_string(),
                ))
            }
        };

        let mut session = OAuth2Session::new(state);
        let raw = self
            .token_exchange
            .fetch_token(&self.config, &mut session, code)
            .await?;
        let tokens = ExchangedTokens::new(raw, Utc::now())?;

        let id_token = tokens.response.id_token.as_deref().ok_or_else(|| {
            AuthnzError::TokenExchange("token response carries no id_token".to_string())
        })?;
        let id_claims = id_token::decode_payload(id_token)?;
        let cookie_nonce = cookie_nonce.ok_or_else(|| {
            AuthnzError::NonceMismatch("no nonce cookie on the callback request".to_string())
        })?;
        if let Err(err) = verify_nonce(&cookie_nonce, id_claims.nonce.as_deref()) {
            log::warn!("Rejecting '{provider}' callback: {err}");
            return Err(err);
        }

        let claims = self.userinfo.fetch_userinfo(&self.config, &session).await?;
        let userinfo_sub = claims.get("sub").and_then(|sub| sub.as_str());
        if let (Some(expected), Some(actual)) = (id_claims.sub.as_deref(), userinfo_sub) {
            if expected != actual {
                return Err(AuthnzError::UserInfoFetch(format!(
                    "userinfo subject '{actual}' does not match identity token subject '{expected}'"
                )));
            }
        }
        let identity = extract_identity(&claims, self.config.claim_mappings())?;

        let existing = ctx
            .store
            .find_token(&identity.external_user_id, provider)
            .await?;
        let user = resolve_user(
            ctx.user.as_ref(),
            existing.as_ref(),
            &identity,
            provider,
            &mut *ctx.store,
        )
        .await?;
        stage_token(&mut *ctx.store, existing, &user, &identity, provider, tokens);
        ctx.store.flush().await?;

        log::info!(
            "User '{}' logged in with '{provider}' as '{}'",
            user.username,
            identity.external_user_id
        );
        ctx.user = Some(user.clone());
        Ok((login_redirect_url.to_string(), user))
    }

    /// Remove the logged-in user's association with `provider_name`.
    ///
    /// Anomalies are reported in the outcome. Only store failures are raised.
    pub async fn disconnect(
        &self,
        provider_name: &str,
        ctx: &mut AuthnzContext<'_>,
        post_disconnect_redirect: &str,
    ) -> AuthnzResult<DisconnectOutcome> {
        let provider = provider_name.to_lowercase();
        let Some(user) = ctx.user.as_ref() else {
            return Ok(DisconnectOutcome::refused(&DisconnectError::NotLoggedIn));
        };

        let mut matching: Vec<ExternalToken> = ctx
            .store
            .user_tokens(user.id)
            .await?
            .into_iter()
            .filter(|token| token.provider == provider)
            .collect();

        match matching.len() {
            1 => {
                let token = matching.remove(0);
                ctx.store.delete_token(&token);
                ctx.store.flush().await?;
                log::info!("User '{}' disconnected from '{provider}'", user.username);
                Ok(DisconnectOutcome::disconnected(post_disconnect_redirect))
            }
            0 => Ok(DisconnectOutcome::refused(&DisconnectError::NoAssociation {
                provider,
            })),
            count => {
                log::warn!("User '{}' has {count} '{provider}' token records", user.username);
                Ok(DisconnectOutcome::refused(
                    &DisconnectError::MultipleAssociations { provider, count },
                ))
            }
        }
    }

    /// Exchange a record's refresh token and update the record in place.
    pub async fn refresh(
        &self,
        store: &mut dyn AuthnzStore,
        mut token: ExternalToken,
    ) -> AuthnzResult<ExternalToken> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            AuthnzError::TokenExchange(format!("Token record {} has no refresh token", token.id))
        })?;
        let raw = self
            .token_exchange
            .refresh_token(&self.config, refresh_token)
            .await?;
        ExchangedTokens::new(raw, Utc::now())?.apply_to(&mut token);

        store.add_token(token.clone());
        store.flush().await?;
        log::debug!("Refreshed '{}' token record {}", token.provider, token.id);
        Ok(token)
    }
}
