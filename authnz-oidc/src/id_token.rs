use authnz_core::{AuthnzError, AuthnzResult};
use jsonwebtoken::dangerous::insecure_decode;
use serde::Deserialize;

/// Claims of an identity token payload.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    /// The hashed nonce sent with the authorization request.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Subject identifier, compared with the userinfo `sub` claim.
    #[serde(default)]
    pub sub: Option<String>,
}

/// Decode the payload of a compact JWT.
///
/// The signature is not verified. Only the nonce and subject are checked by the callback flow.
pub fn decode_payload(id_token: &str) -> AuthnzResult<IdTokenClaims> {
    insecure_decode::<IdTokenClaims>(id_token)
        .map(|data| data.claims)
        .map_err(|e| AuthnzError::TokenExchange(format!("Invalid identity token: {e}")))
}
