//! Configuration Types
//!
//! Credential configuration, issuer endpoints and OAuth exchange settings.

use secrecy::{ExposeSecret, SecretString};
use std::net::IpAddr;
use std::time::Duration;

use crate::error::{AuthError, ConfigurationError};

/// Default Feishu Open Platform base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://open.feishu.cn";

/// Application token endpoint (self-built apps).
pub const APP_TOKEN_PATH: &str = "/open-apis/auth/v3/app_access_token/internal";
/// Tenant token endpoint (self-built apps).
pub const TENANT_TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
/// Authorization-code exchange endpoint.
pub const CODE_EXCHANGE_PATH: &str = "/open-apis/authen/v1/oidc/access_token";
/// Refresh-token exchange endpoint.
pub const REFRESH_TOKEN_PATH: &str = "/open-apis/authen/v1/oidc/refresh_access_token";
/// Browser-facing authorize endpoint.
pub const AUTHORIZE_PATH: &str = "/open-apis/authen/v1/authorize";

/// Default local port for the OAuth redirect listener.
pub const DEFAULT_CALLBACK_PORT: u16 = 3456;
/// Default scope requested during the OAuth exchange.
pub const DEFAULT_SCOPE: &str = "calendar";
/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

/// Environment variable names read by [`CredentialConfig::from_env`].
pub mod env {
    pub const APP_ID: &str = "FEISHU_APP_ID";
    pub const APP_SECRET: &str = "FEISHU_APP_SECRET";
    pub const TENANT_ACCESS_TOKEN: &str = "FEISHU_TENANT_ACCESS_TOKEN";
    pub const USER_ACCESS_TOKEN: &str = "FEISHU_USER_ACCESS_TOKEN";
    pub const REFRESH_TOKEN: &str = "FEISHU_REFRESH_TOKEN";
    pub const USE_APP_TOKEN: &str = "FEISHU_USE_APP_TOKEN";
    pub const USER_ID: &str = "FEISHU_USER_ID";
    pub const API_BASE_URL: &str = "FEISHU_API_BASE_URL";
}

/// Credential configuration owned by the composing application.
#[derive(Clone)]
pub struct CredentialConfig {
    /// Application identifier.
    pub app_id: String,
    /// Application secret.
    pub app_secret: SecretString,
    /// Pre-supplied tenant token, rotated externally.
    pub tenant_access_token: Option<SecretString>,
    /// Pre-supplied user token.
    pub user_access_token: Option<SecretString>,
    /// User refresh token.
    pub refresh_token: Option<SecretString>,
    /// Act with the application token only.
    pub use_app_token: bool,
    /// Open id of the user to act for in application-token mode.
    pub user_id: Option<String>,
    /// API base URL override.
    pub api_base_url: Option<String>,
    /// HTTP timeout.
    pub timeout: Duration,
}

impl CredentialConfig {
    /// Create a configuration holding only application credentials.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: SecretString::new(app_secret.into()),
            tenant_access_token: None,
            user_access_token: None,
            refresh_token: None,
            use_app_token: false,
            user_id: None,
            api_base_url: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Load configuration from `FEISHU_*` environment variables.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let app_id = read(env::APP_ID).ok_or_else(|| missing(env::APP_ID))?;
        let app_secret = read(env::APP_SECRET).ok_or_else(|| missing(env::APP_SECRET))?;

        let mut config = Self::new(app_id, app_secret);
        config.tenant_access_token = read(env::TENANT_ACCESS_TOKEN).map(SecretString::new);
        config.user_access_token = read(env::USER_ACCESS_TOKEN).map(SecretString::new);
        config.refresh_token = read(env::REFRESH_TOKEN).map(SecretString::new);
        config.use_app_token = read(env::USE_APP_TOKEN)
            .map(|v| v.trim() == "true")
            .unwrap_or(false);
        config.user_id = read(env::USER_ID);
        config.api_base_url = read(env::API_BASE_URL);
        Ok(config)
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
    }

    /// Absolute URL for an endpoint path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Whether a user token or refresh token is configured.
    pub fn has_user_credential(&self) -> bool {
        self.user_access_token.is_some() || self.refresh_token.is_some()
    }

    /// The authentication mode this configuration runs in.
    pub fn auth_mode(&self) -> AuthMode {
        if self.use_app_token {
            AuthMode::AppToken
        } else if self.refresh_token.is_some() {
            AuthMode::RefreshToken
        } else if self.user_access_token.is_some() {
            AuthMode::UserToken
        } else {
            AuthMode::TenantToken
        }
    }

    /// True when nothing but the OAuth exchange can produce a user credential.
    pub fn needs_user_authorization(&self) -> bool {
        !self.use_app_token && !self.has_user_credential()
    }
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |s: &Option<SecretString>| s.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("CredentialConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("tenant_access_token", &redact(&self.tenant_access_token))
            .field("user_access_token", &redact(&self.user_access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("use_app_token", &self.use_app_token)
            .field("user_id", &self.user_id)
            .field("api_base_url", &self.api_base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn missing(field: &str) -> AuthError {
    AuthError::Configuration(ConfigurationError::MissingRequired {
        field: field.to_string(),
    })
}

/// Which of the mutually exclusive authentication modes a configuration uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    /// Application token, optionally acting for a configured user id.
    AppToken,
    /// User token minted from a refresh token.
    RefreshToken,
    /// Pre-supplied user token, managed by the caller.
    UserToken,
    /// Tenant token only.
    TenantToken,
}

impl AuthMode {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::AppToken => "application access token",
            Self::RefreshToken => "user access token (refreshed automatically)",
            Self::UserToken => "user access token (managed manually)",
            Self::TenantToken => "tenant access token",
        }
    }
}

/// Local OAuth redirect exchange settings.
#[derive(Clone, Debug)]
pub struct OAuthExchangeSettings {
    /// Interface the listener binds to.
    pub host: String,
    /// Listener port; 0 picks a free port.
    pub port: u16,
    /// Scope requested from the authorize endpoint.
    pub scope: String,
    /// Pause between answering a successful callback and closing the listener.
    pub close_grace: Duration,
}

impl Default for OAuthExchangeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CALLBACK_PORT,
            scope: DEFAULT_SCOPE.to_string(),
            close_grace: Duration::from_secs(2),
        }
    }
}

impl OAuthExchangeSettings {
    /// Redirect URI registered with the identity provider for `port`.
    ///
    /// Loopback and wildcard hosts are addressed as `localhost`; any other host is
    /// used as given.
    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://{}:{}/callback", self.redirect_host(), port)
    }

    fn redirect_host(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(ip) if ip.is_loopback() || ip.is_unspecified() => "localhost".to_string(),
            Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
            Ok(IpAddr::V4(ip)) => ip.to_string(),
            Err(_) => self.host.clone(),
        }
    }
}

pub(crate) fn expose(secret: &SecretString) -> &str {
    secret.expose_secret().as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_minimal() {
        let config = CredentialConfig::from_lookup(lookup(&[
            (env::APP_ID, "cli_a"),
            (env::APP_SECRET, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.app_id, "cli_a");
        assert!(!config.use_app_token);
        assert_eq!(config.base_url(), DEFAULT_API_BASE_URL);
        assert_eq!(config.auth_mode(), AuthMode::TenantToken);
        assert!(config.needs_user_authorization());
    }

    #[test]
    fn test_from_lookup_missing_secret() {
        let result = CredentialConfig::from_lookup(lookup(&[(env::APP_ID, "cli_a")]));
        assert!(matches!(
            result,
            Err(AuthError::Configuration(ConfigurationError::MissingRequired { ref field }))
                if field == env::APP_SECRET
        ));
    }

    #[test]
    fn test_from_lookup_full() {
        let config = CredentialConfig::from_lookup(lookup(&[
            (env::APP_ID, "cli_a"),
            (env::APP_SECRET, "secret"),
            (env::REFRESH_TOKEN, "ur-1"),
            (env::USER_ACCESS_TOKEN, ""),
            (env::USE_APP_TOKEN, "true"),
            (env::USER_ID, "ou_123"),
            (env::API_BASE_URL, "https://open.larksuite.com/"),
        ]))
        .unwrap();

        assert!(config.user_access_token.is_none());
        assert!(config.refresh_token.is_some());
        assert!(config.use_app_token);
        assert_eq!(config.auth_mode(), AuthMode::AppToken);
        assert_eq!(
            config.endpoint(TENANT_TOKEN_PATH),
            "https://open.larksuite.com/open-apis/auth/v3/tenant_access_token/internal"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = CredentialConfig::new("cli_a", "super-secret");
        config.refresh_token = Some(SecretString::new("ur-secret".to_string()));
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("ur-secret"));
        assert!(rendered.contains("cli_a"));
    }

    #[test]
    fn test_redirect_uri() {
        let settings = OAuthExchangeSettings::default();
        assert_eq!(settings.redirect_uri(3456), "http://localhost:3456/callback");

        let wildcard = OAuthExchangeSettings {
            host: "0.0.0.0".to_string(),
            ..OAuthExchangeSettings::default()
        };
        assert_eq!(wildcard.redirect_uri(3456), "http://localhost:3456/callback");

        let lan = OAuthExchangeSettings {
            host: "192.168.1.20".to_string(),
            ..OAuthExchangeSettings::default()
        };
        assert_eq!(lan.redirect_uri(8080), "http://192.168.1.20:8080/callback");

        let named = OAuthExchangeSettings {
            host: "auth.internal".to_string(),
            ..OAuthExchangeSettings::default()
        };
        assert_eq!(named.redirect_uri(80), "http://auth.internal:80/callback");
    }
}
