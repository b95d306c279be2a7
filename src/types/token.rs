//! Token Types
//!
//! Credential kinds, cache entries and the token grants returned by the issuer.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds subtracted from every issuer-declared lifetime before caching.
pub const EXPIRY_SAFETY_MARGIN_SECS: u64 = 300;

// Upper bound keeps `now + lifetime` inside chrono's range.
const MAX_CACHE_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

/// The three mutually exclusive credential kinds accepted by the calendar API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Identifies the application itself.
    Application,
    /// Scoped to one organizational tenant.
    Tenant,
    /// Scoped to one consenting end user.
    User,
}

impl CredentialKind {
    /// All kinds, in cache order.
    pub const ALL: [CredentialKind; 3] = [Self::Application, Self::Tenant, Self::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Tenant => "tenant",
            Self::User => "user",
        }
    }

    /// Pick the credential kind an outbound call must present.
    ///
    /// Application-token mode wins over everything. Otherwise an explicit request for
    /// the user token, or any configured user credential, selects the user token.
    /// Tenant is the fallback.
    pub fn select(use_user_token: bool, app_token_mode: bool, has_user_credential: bool) -> Self {
        if app_token_mode {
            Self::Application
        } else if use_user_token || has_user_credential {
            Self::User
        } else {
            Self::Tenant
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cached bearer token and the instant it stops being usable.
#[derive(Clone, Debug)]
pub struct TokenCacheEntry {
    /// Bearer token value.
    pub token: SecretString,
    /// Usable while `now < expires_at`.
    pub expires_at: DateTime<Utc>,
}

impl TokenCacheEntry {
    /// Create an entry with an explicit expiry instant.
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_at,
        }
    }

    /// Create an entry from an issuer lifetime, applying the safety margin.
    ///
    /// Lifetimes at or under the margin produce an entry that is already expired.
    pub fn from_lifetime(token: impl Into<String>, lifetime_secs: u64, now: DateTime<Utc>) -> Self {
        let usable = lifetime_secs
            .saturating_sub(EXPIRY_SAFETY_MARGIN_SECS)
            .min(MAX_CACHE_LIFETIME_SECS);
        Self::new(token, now + Duration::seconds(usable as i64))
    }

    /// Check if the entry is usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub(crate) fn expose(&self) -> String {
        self.token.expose_secret().clone()
    }
}

/// Application or tenant token as issued, before caching.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    /// Bearer token value.
    pub token: SecretString,
    /// Issuer-declared lifetime in seconds.
    pub lifetime_secs: u64,
}

/// User token grant returned by the code-exchange and refresh endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct UserTokenGrant {
    /// User access token.
    pub access_token: String,
    /// Refresh token; a value different from the one presented means rotation.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token lifetime in seconds, when the issuer reports it.
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl UserTokenGrant {
    /// Grant with the default token type and no refresh-token lifetime.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_in,
            refresh_expires_in: None,
            token_type: default_token_type(),
        }
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Tokens handed back by a completed OAuth bootstrap exchange.
///
/// The caller owns persisting `refresh_token`.
#[derive(Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_as_str() {
        assert_eq!(CredentialKind::Application.as_str(), "application");
        assert_eq!(CredentialKind::Tenant.to_string(), "tenant");
        assert_eq!(CredentialKind::User.to_string(), "user");
    }

    #[test]
    fn test_select_app_mode_wins() {
        for use_user in [false, true] {
            for has_user in [false, true] {
                assert_eq!(
                    CredentialKind::select(use_user, true, has_user),
                    CredentialKind::Application
                );
            }
        }
    }

    #[test]
    fn test_select_user_credential_beats_tenant() {
        assert_eq!(CredentialKind::select(false, false, true), CredentialKind::User);
        assert_eq!(CredentialKind::select(true, false, false), CredentialKind::User);
        assert_eq!(CredentialKind::select(false, false, false), CredentialKind::Tenant);
    }

    #[test]
    fn test_entry_applies_margin() {
        let now = Utc::now();
        let entry = TokenCacheEntry::from_lifetime("t", 7200, now);
        assert_eq!(entry.expires_at, now + Duration::seconds(6900));
        assert!(entry.is_valid_at(now));
    }

    #[test]
    fn test_short_lifetime_is_immediately_expired() {
        let now = Utc::now();
        for lifetime in [0, 1, 299, 300] {
            let entry = TokenCacheEntry::from_lifetime("t", lifetime, now);
            assert_eq!(entry.expires_at, now);
            assert!(!entry.is_valid_at(now));
        }
    }

    #[test]
    fn test_user_grant_optional_fields() {
        let grant: UserTokenGrant =
            serde_json::from_str(r#"{"access_token":"u-1","expires_in":7200}"#).unwrap();
        assert_eq!(grant.access_token, "u-1");
        assert!(grant.refresh_token.is_none());
        assert_eq!(grant.token_type, "Bearer");
    }

    #[test]
    fn test_oauth_tokens_debug_redacts() {
        let tokens = OAuthTokens {
            access_token: "u-secret".to_string(),
            refresh_token: "ur-secret".to_string(),
            expires_in: 7200,
        };
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret"));
    }
}
