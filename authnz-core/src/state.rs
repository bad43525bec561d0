use crate::error::{AuthnzError, AuthnzResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Claims returned by a provider's userinfo endpoint.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Identifier of a local user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Allocate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A local user account, as seen by the authentication core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    /// Account identifier.
    pub id: UserId,
    /// Email address.
    pub email: String,
    /// Public user name.
    pub username: String,
    /// Credential required by the user schema. Accounts created from an
    /// external identity get a random value that is never used to log in.
    pub password: String,
}

impl LocalUser {
    /// Create an account for an externally authenticated user.
    pub fn new(email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            username: username.into(),
            password: Uuid::new_v4().simple().to_string(),
        }
    }
}

/// The typed view of a token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token used for API requests
    pub access_token: String,
    /// The type of token (usually "Bearer")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// The OIDC ID Token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// The refresh token used to obtain new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    /// Seconds until the refresh token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<i64>,
}

impl TokenResponse {
    /// Read the typed fields out of a raw token response.
    pub fn from_raw(raw: &serde_json::Value) -> AuthnzResult<Self> {
        serde_json::from_value(raw.clone()).map_err(|e| {
            AuthnzError::TokenExchange(format!("Malformed token response: {e}"))
        })
    }

    /// Absolute access token expiry, counted from `now`.
    pub fn expiration_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.and_then(|secs| offset(now, secs))
    }

    /// Absolute refresh token expiry, counted from `now`.
    pub fn refresh_expiration_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.refresh_expires_in.and_then(|secs| offset(now, secs))
    }
}

// Out of range lifetimes are treated as unknown.
fn offset(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    now.checked_add_signed(Duration::try_seconds(secs)?)
}

/// The stored association between a local user and an external identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalToken {
    /// Record identifier. Stable across in-place updates.
    pub id: Uuid,
    /// Owning local user.
    pub user_id: UserId,
    /// The provider's subject identifier for the user.
    pub external_user_id: String,
    /// Lower-cased provider name.
    pub provider: String,
    /// Latest access token.
    pub access_token: String,
    /// Latest identity token.
    pub id_token: String,
    /// Latest refresh token, if the provider issues them.
    pub refresh_token: Option<String>,
    /// Full token response, preserved verbatim.
    pub raw_token: serde_json::Value,
    /// When the access token expires.
    pub expiration_time: Option<DateTime<Utc>>,
    /// When the refresh token expires.
    pub refresh_expiration_time: Option<DateTime<Utc>>,
}

impl ExternalToken {
    /// Whether the access token is past its expiry. Tokens without a known
    /// lifetime never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time.is_some_and(|at| now >= at)
    }

    /// Whether the refresh token is past its expiry.
    pub fn refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expiration_time.is_some_and(|at| now >= at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_user_gets_random_password() {
        let a = LocalUser::new("a@example.com", "a");
        let b = LocalUser::new("a@example.com", "a");
        assert!(!a.password.is_empty());
        assert_ne!(a.password, b.password);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_token_response_from_raw() {
        let raw = json!({
            "access_token": "at",
            "id_token": "it",
            "refresh_token": "rt",
            "expires_in": 30,
            "refresh_expires_in": 1800,
            "not_before_policy": 0
        });
        let token = TokenResponse::from_raw(&raw).unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));

        let now = Utc::now();
        assert_eq!(token.expiration_time(now), Some(now + Duration::seconds(30)));
        assert_eq!(
            token.refresh_expiration_time(now),
            Some(now + Duration::seconds(1800))
        );

        let huge = TokenResponse::from_raw(&json!({ "access_token": "at", "expires_in": i64::MAX }))
            .unwrap();
        assert!(huge.expiration_time(now).is_none());

        let missing = json!({ "id_token": "it" });
        assert!(matches!(
            TokenResponse::from_raw(&missing),
            Err(AuthnzError::TokenExchange(_))
        ));
    }

    #[test]
    fn test_expiry_checks() {
        let now = Utc::now();
        let mut token = ExternalToken {
            id: Uuid::new_v4(),
            user_id: UserId::new(),
            external_user_id: "sub".into(),
            provider: "google".into(),
            access_token: "at".into(),
            id_token: "it".into(),
            refresh_token: None,
            raw_token: json!({}),
            expiration_time: Some(now - Duration::seconds(1)),
            refresh_expiration_time: None,
        };
        assert!(token.is_expired(now));
        assert!(!token.refresh_expired(now));

        token.expiration_time = None;
        assert!(!token.is_expired(now));
    }
}
