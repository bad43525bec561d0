//! # Authnz Core
//!
//! `authnz-core` provides the foundational types for the authnz OpenID Connect core.
//! It defines the error taxonomy, the user and external token records, the state/nonce
//! manager and the persistence capability consumed by the authentication flows.

#![warn(missing_docs)]

use cookie::CookieJar;
use serde::{Deserialize, Serialize};

/// Errors raised by the authentication core.
pub mod error;
pub use error::{AuthnzError, AuthnzResult, DisconnectError};

/// Local users, external token records and token responses.
pub mod state;
pub use state::{Claims, ExternalToken, LocalUser, TokenResponse, UserId};

/// State and nonce generation and verification.
pub mod nonce;

/// Flow cookie names and attributes.
pub mod cookies;
pub use cookies::{CookieConfig, SameSite, NONCE_COOKIE_NAME, STATE_COOKIE_NAME};

/// The persistence capability.
pub mod store;
pub use store::{AuthnzStore, Change, PendingChanges};

pub use cookie;

/// Everything an authentication flow needs from the current web request.
pub struct AuthnzContext<'a> {
    /// Cookies of the current request; flow cookies are written here.
    pub cookies: &'a mut CookieJar,
    /// Unit of work on the user and token store.
    pub store: &'a mut dyn AuthnzStore,
    /// The user already logged in on this request, if any.
    pub user: Option<LocalUser>,
    /// Whether the request arrived over TLS. Controls the `Secure` cookie flag.
    pub secure: bool,
}

impl<'a> AuthnzContext<'a> {
    /// Create a context for an anonymous request.
    pub fn new(cookies: &'a mut CookieJar, store: &'a mut dyn AuthnzStore) -> Self {
        Self {
            cookies,
            store,
            user: None,
            secure: true,
        }
    }

    /// Attach the logged-in user.
    pub fn with_user(mut self, user: LocalUser) -> Self {
        self.user = Some(user);
        self
    }

    /// Set whether the request arrived over TLS.
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// Result of a disconnect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectOutcome {
    /// Whether the association was removed.
    pub success: bool,
    /// Empty on success, a user-facing explanation otherwise.
    pub message: String,
    /// Where to send the user next. Only set on success.
    pub redirect: Option<String>,
}

impl DisconnectOutcome {
    /// A successful disconnect.
    pub fn disconnected(redirect: impl Into<String>) -> Self {
        Self {
            success: true,
            message: String::new(),
            redirect: Some(redirect.into()),
        }
    }

    /// A refused disconnect.
    pub fn refused(reason: &DisconnectError) -> Self {
        Self {
            success: false,
            message: reason.to_string(),
            redirect: None,
        }
    }
}
