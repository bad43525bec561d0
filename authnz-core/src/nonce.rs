//! Anti-CSRF state and anti-replay nonce values.
//!
//! Both values travel through short-lived cookies. The state is echoed back
//! verbatim by the provider; the nonce is only ever sent as its SHA-256 digest
//! and comes back embedded in the identity token.

use crate::error::{AuthnzError, AuthnzResult};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Length of generated state and nonce tokens.
pub const TOKEN_LENGTH: usize = 30;

fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Generate a fresh CSRF state token.
pub fn generate_state() -> String {
    random_token()
}

/// Generate a fresh raw nonce.
pub fn generate_nonce() -> String {
    random_token()
}

/// One-way digest of a raw nonce, as sent to the provider.
pub fn hash_nonce(nonce: &str) -> String {
    format!("{:x}", Sha256::digest(nonce.as_bytes()))
}

/// Check the nonce claim of an identity token against the raw cookie nonce.
pub fn verify_nonce(cookie_nonce: &str, id_token_nonce: Option<&str>) -> AuthnzResult<()> {
    let claimed = id_token_nonce.ok_or_else(|| {
        AuthnzError::NonceMismatch("identity token carries no nonce claim".to_string())
    })?;

    if hash_nonce(cookie_nonce) != claimed {
        return Err(AuthnzError::NonceMismatch(
            "identity token nonce does not match the session nonce".to_string(),
        ));
    }
    Ok(())
}
