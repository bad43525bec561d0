use crate::config::{ClaimKind, ClaimMappings};
use authnz_core::{AuthnzError, AuthnzResult, AuthnzStore, Claims, ExternalToken, LocalUser};
use serde_json::Value;

/// The local identity read out of a userinfo response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// The provider's subject identifier.
    pub external_user_id: String,
    /// Email address.
    pub email: String,
    /// User name.
    pub username: String,
}

fn claim_value(claims: &Claims, name: &str) -> Option<String> {
    match claims.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract email, username and subject through the provider's claim mapping.
///
/// A missing username falls back to the local part of the email address.
pub fn extract_identity(claims: &Claims, mappings: &ClaimMappings) -> AuthnzResult<ResolvedIdentity> {
    let required = |kind: ClaimKind| {
        let name = mappings.claim_name(kind);
        claim_value(claims, name).ok_or_else(|| AuthnzError::MissingClaim(name.to_string()))
    };
    let external_user_id = required(ClaimKind::Id)?;
    let email = required(ClaimKind::Email)?;

    let username = claim_value(claims, mappings.claim_name(ClaimKind::Username))
        .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

    Ok(ResolvedIdentity {
        external_user_id,
        email,
        username,
    })
}

/// Decide which local user an external identity logs in as.
///
/// The logged-in user wins, then the owner of the existing token record.
/// Otherwise a new user is staged on `store`.
pub async fn resolve_user(
    logged_in: Option<&LocalUser>,
    existing: Option<&ExternalToken>,
    identity: &ResolvedIdentity,
    provider: &str,
    store: &mut dyn AuthnzStore,
) -> AuthnzResult<LocalUser> {
    if let Some(user) = logged_in {
        if existing.is_some_and(|token| token.user_id != user.id) {
            return Err(AuthnzError::IdentityConflict {
                provider: provider.to_string(),
            });
        }
        return Ok(user.clone());
    }

    if let Some(token) = existing {
        return store.load_user(token.user_id).await?.ok_or_else(|| {
            AuthnzError::Store(format!(
                "Token record {} references missing user {}",
                token.id, token.user_id
            ))
        });
    }

    let user = LocalUser::new(&identity.email, &identity.username);
    log::debug!(
        "Creating local user '{}' for '{}' identity",
        user.username,
        provider
    );
    store.add_user(user.clone());
    Ok(user)
}
