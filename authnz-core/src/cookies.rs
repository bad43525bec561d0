use cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};

/// Cookie carrying the CSRF state between authorization and callback.
pub const STATE_COOKIE_NAME: &str = "authnz-oidc-state";

/// Cookie carrying the raw nonce between authorization and callback.
pub const NONCE_COOKIE_NAME: &str = "authnz-oidc-nonce";

/// Controls whether a cookie is sent with cross-site requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// The cookie is sent with "safe" cross-site requests (e.g., following a link).
    Lax,
    /// The cookie is only sent for same-site requests.
    Strict,
    /// The cookie is sent with all requests, including cross-site. Requires `Secure`.
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(ss: SameSite) -> Self {
        match ss {
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::None => cookie::SameSite::None,
        }
    }
}

/// Attributes of the short-lived flow cookies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    /// Path the cookies are scoped to.
    pub path: String,
    /// Whether the cookies are hidden from scripts.
    pub http_only: bool,
    /// Cross-site policy.
    pub same_site: SameSite,
    /// Lifetime of a pending authorization attempt, in seconds.
    pub max_age_secs: Option<i64>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            http_only: true,
            same_site: SameSite::Lax,
            max_age_secs: Some(15 * 60),
        }
    }
}

impl CookieConfig {
    /// Build a flow cookie. `secure` follows the scheme of the current request.
    pub fn build_cookie(
        &self,
        name: &'static str,
        value: String,
        secure: bool,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path(self.path.clone())
            .secure(secure)
            .http_only(self.http_only)
            .same_site(self.same_site.into());

        if let Some(secs) = self.max_age_secs {
            builder = builder.max_age(cookie::time::Duration::seconds(secs));
        }
        builder.build()
    }
}

/// Read a flow cookie and remove it from the jar.
///
/// The removal cookie carries the configured path so the browser drops the
/// cookie that was set by [`CookieConfig::build_cookie`].
pub fn take_cookie(
    jar: &mut CookieJar,
    name: &'static str,
    config: &CookieConfig,
) -> Option<String> {
    let value = jar.get(name).map(|c| c.value().to_string())?;
    jar.remove(Cookie::build(name).path(config.path.clone()));
    Some(value)
}
