//! Feishu Auth Client
//!
//! High-level entry point: resolves the right credential for a calendar call and
//! builds its request headers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{create_transport, ReqwestHttpTransport};
use crate::error::AuthResult;
use crate::flows::{DefaultIdentityClient, IdentityClient, OAuthExchangeFlow};
use crate::telemetry::AuthLogContext;
use crate::token::TokenProvider;
use crate::types::{CredentialConfig, CredentialKind, OAuthExchangeSettings, OAuthTokens};

/// Credential client for the Feishu calendar API.
pub struct FeishuAuthClient<C: IdentityClient = DefaultIdentityClient<ReqwestHttpTransport>> {
    provider: Arc<TokenProvider<C>>,
    config_hint_shown: AtomicBool,
}

impl FeishuAuthClient<DefaultIdentityClient<ReqwestHttpTransport>> {
    /// Create a client that talks to the configured Feishu endpoints.
    pub fn new(config: CredentialConfig) -> AuthResult<Self> {
        let transport = Arc::new(create_transport(Some(config.timeout))?);
        let identity = DefaultIdentityClient::new(&config, transport);
        Ok(Self::with_identity_client(config, identity))
    }
}

impl<C: IdentityClient> FeishuAuthClient<C> {
    /// Create a client with a custom identity client.
    pub fn with_identity_client(config: CredentialConfig, identity: C) -> Self {
        Self::from_provider(TokenProvider::new(config, Arc::new(identity)))
    }

    /// Wrap an already configured provider.
    pub fn from_provider(provider: TokenProvider<C>) -> Self {
        Self {
            provider: Arc::new(provider),
            config_hint_shown: AtomicBool::new(false),
        }
    }

    /// Current configuration, including any rotated refresh token.
    pub fn config(&self) -> CredentialConfig {
        self.provider.config()
    }

    pub fn provider(&self) -> &Arc<TokenProvider<C>> {
        &self.provider
    }

    /// Credential kind used for a call.
    pub fn select_kind(&self, use_user_token: bool) -> CredentialKind {
        self.provider
            .select_kind(use_user_token, self.config().use_app_token)
    }

    /// Resolve a token of `kind`.
    pub async fn token(&self, kind: CredentialKind) -> AuthResult<String> {
        self.provider.resolve(kind).await
    }

    /// Headers for an authenticated calendar call.
    pub async fn auth_headers(&self, use_user_token: bool) -> AuthResult<HashMap<String, String>> {
        self.hint_if_unconfigured();
        let kind = self.select_kind(use_user_token);
        let token = self.provider.resolve(kind).await?;
        Ok(build_auth_headers(&token))
    }

    /// Query parameters that make an application-token call act for the configured user.
    ///
    /// Empty unless application-token mode is on and a user id is configured.
    pub fn acting_user_query(&self) -> Vec<(&'static str, String)> {
        let config = self.config();
        match (&config.user_id, config.use_app_token) {
            (Some(user_id), true) => vec![
                ("user_id_type", "open_id".to_string()),
                ("user_id", user_id.clone()),
            ],
            _ => Vec::new(),
        }
    }

    /// OAuth bootstrap exchange sharing this client's identity client and logger.
    pub fn oauth_exchange(&self, settings: OAuthExchangeSettings) -> OAuthExchangeFlow<C> {
        OAuthExchangeFlow::new(
            Arc::clone(self.provider.identity()),
            &self.config(),
            settings,
        )
        .with_logger(Arc::clone(self.provider.logger()))
    }

    /// Run the OAuth bootstrap exchange with default settings.
    pub async fn run_oauth_exchange(&self) -> AuthResult<OAuthTokens> {
        self.oauth_exchange(OAuthExchangeSettings::default())
            .run()
            .await
    }

    fn hint_if_unconfigured(&self) {
        if !self.config().needs_user_authorization()
            || self.config_hint_shown.swap(true, Ordering::SeqCst)
        {
            return;
        }
        self.provider.logger().warn(
            "no user credential configured; calls use the tenant token. Run the \
             feishu-calendar-auth helper to obtain FEISHU_REFRESH_TOKEN, or set \
             FEISHU_USE_APP_TOKEN=true with FEISHU_USER_ID",
            &AuthLogContext::new()
                .operation("auth_headers")
                .app_id(&self.config().app_id),
        );
    }
}

/// Authorization and content-type headers for `token`.
pub fn build_auth_headers(token: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Bearer {}", token));
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers
}

/// Create a client from `FEISHU_*` environment variables.
pub fn feishu_auth_client_from_env() -> AuthResult<FeishuAuthClient> {
    FeishuAuthClient::new(CredentialConfig::from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::credential_config;
    use crate::flows::MockIdentityClient;
    use crate::telemetry::{InMemoryLogger, LogLevel};

    fn client(config: CredentialConfig, identity: MockIdentityClient) -> FeishuAuthClient<MockIdentityClient> {
        FeishuAuthClient::with_identity_client(config, identity)
    }

    #[test]
    fn test_client_creation() {
        let config = credential_config()
            .app_id("cli_a")
            .app_secret("secret")
            .build()
            .unwrap();
        assert!(FeishuAuthClient::new(config).is_ok());
    }

    #[test]
    fn test_build_auth_headers() {
        let headers = build_auth_headers("t-1");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["Authorization"], "Bearer t-1");
        assert_eq!(headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn test_app_mode_headers() {
        let identity = MockIdentityClient::new();
        identity.set_app_token("a-1", 7200);
        let config = credential_config()
            .app_id("cli_a")
            .app_secret("secret")
            .use_app_token(true)
            .user_id("ou_123")
            .build()
            .unwrap();
        let client = client(config, identity);

        let headers = client.auth_headers(true).await.unwrap();
        assert_eq!(headers["Authorization"], "Bearer a-1");
        assert_eq!(client.provider().identity().app_calls(), 1);
        assert_eq!(
            client.acting_user_query(),
            vec![
                ("user_id_type", "open_id".to_string()),
                ("user_id", "ou_123".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_tenant_headers_and_hint() {
        let identity = MockIdentityClient::new();
        identity.set_tenant_token("t-1", 7200);
        let logger = Arc::new(InMemoryLogger::new());
        let config = CredentialConfig::new("cli_a", "secret");
        let provider =
            TokenProvider::new(config, Arc::new(identity)).with_logger(logger.clone());
        let client = FeishuAuthClient::from_provider(provider);

        for _ in 0..2 {
            let headers = client.auth_headers(false).await.unwrap();
            assert_eq!(headers["Authorization"], "Bearer t-1");
        }
        assert!(client.acting_user_query().is_empty());
        assert_eq!(logger.get_entries_by_level(LogLevel::Warn).len(), 1);
    }

    #[test]
    fn test_select_kind_with_refresh_token() {
        let config = credential_config()
            .app_id("cli_a")
            .app_secret("secret")
            .refresh_token("ur-1")
            .build()
            .unwrap();
        let client = client(config, MockIdentityClient::new());

        assert_eq!(client.select_kind(false), CredentialKind::User);
    }
}
