use thiserror::Error;

/// Result alias used throughout the authnz crates.
pub type AuthnzResult<T> = Result<T, AuthnzError>;

/// Faults raised by the authentication core.
///
/// Configuration, state and nonce errors are always raised before the store
/// is touched. The caller is responsible for turning them into an HTTP
/// response.
#[derive(Debug, Error)]
pub enum AuthnzError {
    /// Missing or incomplete provider configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// No state was available to bind the token exchange to.
    #[error("State mismatch: {0}")]
    StateMismatch(String),
    /// The identity token nonce does not match the hashed cookie nonce.
    #[error("Nonce mismatch: {0}")]
    NonceMismatch(String),
    /// The token endpoint rejected the request or could not be reached.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),
    /// The userinfo endpoint rejected the request or could not be reached.
    #[error("Userinfo fetch failed: {0}")]
    UserInfoFetch(String),
    /// A claim required to identify the user is absent from the userinfo response.
    #[error("Claim '{0}' missing from userinfo response")]
    MissingClaim(String),
    /// The external identity is already linked to another local account.
    #[error("External identity for provider '{provider}' is linked to another account")]
    IdentityConflict {
        /// Provider the identity belongs to.
        provider: String,
    },
    /// No provider is registered under the requested name.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    /// The persistence layer failed.
    #[error("Store error: {0}")]
    Store(String),
}

/// Reasons a disconnect request cannot be honoured.
///
/// These are reported back to the user through [`crate::DisconnectOutcome`]
/// and are never raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectError {
    /// Disconnecting requires a logged-in user.
    #[error("You must be logged in to disconnect an identity provider.")]
    NotLoggedIn,
    /// The user has no identity linked with this provider.
    #[error("Not logged in with '{provider}', so nothing to disconnect.")]
    NoAssociation {
        /// Provider that was requested.
        provider: String,
    },
    /// More than one identity is linked with this provider.
    #[error(
        "Found {count} identities linked with '{provider}', cannot decide which one to disconnect."
    )]
    MultipleAssociations {
        /// Provider that was requested.
        provider: String,
        /// Number of linked records found.
        count: usize,
    },
}
