use crate::identity::ResolvedIdentity;
use authnz_core::{AuthnzResult, AuthnzStore, ExternalToken, LocalUser, TokenResponse};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A token endpoint response together with the instant it was received.
#[derive(Debug, Clone)]
pub struct ExchangedTokens {
    /// The response as returned by the provider.
    pub raw: Value,
    /// Typed view of `raw`.
    pub response: TokenResponse,
    /// When the exchange completed. Expirations are counted from here.
    pub exchanged_at: DateTime<Utc>,
}

impl ExchangedTokens {
    /// Parse a raw token response received at `exchanged_at`.
    pub fn new(raw: Value, exchanged_at: DateTime<Utc>) -> AuthnzResult<Self> {
        let response = TokenResponse::from_raw(&raw)?;
        Ok(Self {
            raw,
            response,
            exchanged_at,
        })
    }

    /// Copy the tokens onto a record.
    ///
    /// A refresh or identity token missing from the response keeps its previous value.
    pub fn apply_to(self, record: &mut ExternalToken) {
        let now = self.exchanged_at;
        record.expiration_time = self.response.expiration_time(now);
        record.refresh_expiration_time = self.response.refresh_expiration_time(now);
        record.access_token = self.response.access_token;
        if let Some(id_token) = self.response.id_token {
            record.id_token = id_token;
        }
        if let Some(refresh_token) = self.response.refresh_token {
            record.refresh_token = Some(refresh_token);
        }
        record.raw_token = self.raw;
    }
}

/// Stage the token record for a completed login.
///
/// An existing record is updated in place and keeps its id. Otherwise a new
/// record is created for `user`.
pub fn stage_token(
    store: &mut dyn AuthnzStore,
    existing: Option<ExternalToken>,
    user: &LocalUser,
    identity: &ResolvedIdentity,
    provider: &str,
    tokens: ExchangedTokens,
) -> ExternalToken {
    let mut record = existing.unwrap_or_else(|| ExternalToken {
        id: Uuid::new_v4(),
        user_id: user.id,
        external_user_id: identity.external_user_id.clone(),
        provider: provider.to_string(),
        access_token: String::new(),
        id_token: String::new(),
        refresh_token: None,
        raw_token: Value::Null,
        expiration_time: None,
        refresh_expiration_time: None,
    });
    tokens.apply_to(&mut record);
    store.add_token(record.clone());
    record
}
