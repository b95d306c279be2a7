//! Token Issuance
//!
//! Calls to the Feishu identity endpoints. This is the only code that talks to the
//! issuer; caching and single-flight live in the token provider.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::envelope::decode_issuer_payload;
use crate::core::transport::lock;
use crate::core::{HttpRequest, HttpTransport};
use crate::error::{AuthError, AuthResult, AuthorizationError, CredentialError};
use crate::resilience::{IssuanceRetryExecutor, RetryConfig, RetryExecutor};
use crate::types::{
    expose, CredentialConfig, CredentialKind, IssuedToken, UserTokenGrant, APP_TOKEN_PATH,
    CODE_EXCHANGE_PATH, REFRESH_TOKEN_PATH, TENANT_TOKEN_PATH,
};

/// Identity endpoint client interface.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Request an application access token.
    async fn request_app_token(&self) -> AuthResult<IssuedToken>;

    /// Request a tenant access token.
    async fn request_tenant_token(&self) -> AuthResult<IssuedToken>;

    /// Exchange a refresh token for a new user token grant.
    ///
    /// `app_token` authenticates the calling application.
    async fn refresh_user_token(
        &self,
        refresh_token: &str,
        app_token: &str,
    ) -> AuthResult<UserTokenGrant>;

    /// Exchange a one-time authorization code for a user token grant.
    async fn exchange_code(&self, code: &str) -> AuthResult<UserTokenGrant>;
}

#[derive(Serialize)]
struct AppCredentialsBody<'a> {
    app_id: &'a str,
    app_secret: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct CodeExchangeBody<'a> {
    app_id: &'a str,
    app_secret: &'a str,
    grant_type: &'static str,
    code: &'a str,
}

#[derive(Deserialize)]
struct AppTokenPayload {
    app_access_token: String,
    expire: u64,
}

#[derive(Deserialize)]
struct TenantTokenPayload {
    tenant_access_token: String,
    expire: u64,
}

/// Identity client backed by an [`HttpTransport`].
pub struct DefaultIdentityClient<T: HttpTransport> {
    app_id: String,
    app_secret: SecretString,
    base_url: String,
    timeout: Duration,
    transport: Arc<T>,
    retry: IssuanceRetryExecutor,
}

impl<T: HttpTransport> DefaultIdentityClient<T> {
    /// Create new identity client.
    pub fn new(config: &CredentialConfig, transport: Arc<T>) -> Self {
        Self::with_retry_config(config, transport, RetryConfig::default())
    }

    /// Create identity client with a custom retry policy for app/tenant issuance.
    pub fn with_retry_config(
        config: &CredentialConfig,
        transport: Arc<T>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            base_url: config.base_url().to_string(),
            timeout: config.timeout,
            transport,
            retry: IssuanceRetryExecutor::new(retry),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn json_request<B: Serialize>(&self, path: &str, body: &B) -> AuthResult<HttpRequest> {
        let body = serde_json::to_string(body).map_err(|e| {
            AuthError::Protocol(crate::error::ProtocolError::InvalidJson {
                message: e.to_string(),
            })
        })?;
        Ok(HttpRequest::post_json(self.url(path), body).timeout(self.timeout))
    }

    fn credentials_body(&self) -> AppCredentialsBody<'_> {
        AppCredentialsBody {
            app_id: &self.app_id,
            app_secret: expose(&self.app_secret),
        }
    }

    async fn issue<P, F>(
        &self,
        kind: CredentialKind,
        path: &str,
        extract: F,
    ) -> AuthResult<IssuedToken>
    where
        P: for<'de> Deserialize<'de> + Send,
        F: Fn(P) -> (String, u64) + Send + Sync,
    {
        let request = self.json_request(path, &self.credentials_body())?;
        let transport = &self.transport;
        let request = &request;

        let payload: P = self
            .retry
            .execute(move || async move {
                let response = transport.send(request.clone()).await?;
                decode_issuer_payload::<P, _>(&response, |code, message| {
                    AuthError::Credential(CredentialError::IssuanceFailed {
                        kind,
                        code,
                        message,
                    })
                })
            })
            .await?;

        let (token, lifetime_secs) = extract(payload);
        if token.is_empty() {
            return Err(AuthError::Credential(CredentialError::IssuanceFailed {
                kind,
                code: 0,
                message: "issuer returned an empty token".to_string(),
            }));
        }

        tracing::debug!(kind = %kind, lifetime_secs, "issued access token");
        Ok(IssuedToken {
            token: SecretString::new(token),
            lifetime_secs,
        })
    }
}

#[async_trait]
impl<T: HttpTransport> IdentityClient for DefaultIdentityClient<T> {
    async fn request_app_token(&self) -> AuthResult<IssuedToken> {
        self.issue(CredentialKind::Application, APP_TOKEN_PATH, |p: AppTokenPayload| {
            (p.app_access_token, p.expire)
        })
        .await
    }

    async fn request_tenant_token(&self) -> AuthResult<IssuedToken> {
        self.issue(CredentialKind::Tenant, TENANT_TOKEN_PATH, |p: TenantTokenPayload| {
            (p.tenant_access_token, p.expire)
        })
        .await
    }

    async fn refresh_user_token(
        &self,
        refresh_token: &str,
        app_token: &str,
    ) -> AuthResult<UserTokenGrant> {
        let body = RefreshBody {
            grant_type: "refresh_token",
            refresh_token,
        };
        let request = self.json_request(REFRESH_TOKEN_PATH, &body)?.bearer(app_token);

        // Single attempt: a replay could present an already-rotated refresh token.
        let response = self.transport.send(request).await?;
        let grant: UserTokenGrant = decode_issuer_payload(&response, |code, message| {
            AuthError::Credential(CredentialError::RefreshFailed { code, message })
        })?;

        if grant.access_token.is_empty() {
            return Err(AuthError::Credential(CredentialError::RefreshFailed {
                code: 0,
                message: "issuer returned an empty access token".to_string(),
            }));
        }
        Ok(grant)
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<UserTokenGrant> {
        let body = CodeExchangeBody {
            app_id: &self.app_id,
            app_secret: expose(&self.app_secret),
            grant_type: "authorization_code",
            code,
        };
        let request = self.json_request(CODE_EXCHANGE_PATH, &body)?;

        let response = self.transport.send(request).await?;
        let grant: UserTokenGrant = decode_issuer_payload(&response, |code, message| {
            AuthError::Authorization(AuthorizationError::ExchangeFailed { code, message })
        })?;

        let has_refresh_token = grant
            .refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false);
        if grant.access_token.is_empty() || !has_refresh_token {
            return Err(AuthError::Authorization(AuthorizationError::ExchangeFailed {
                code: 0,
                message: "issuer response lacks access_token or refresh_token".to_string(),
            }));
        }
        Ok(grant)
    }
}

/// Mock identity client for testing.
///
/// Refresh grants are returned in queue order; an empty queue yields a grant that
/// echoes the presented refresh token.
pub struct MockIdentityClient {
    app_token: Mutex<(String, u64)>,
    tenant_token: Mutex<(String, u64)>,
    refresh_grants: Mutex<VecDeque<UserTokenGrant>>,
    exchange_grant: Mutex<Option<UserTokenGrant>>,
    next_error: Mutex<Option<AuthError>>,
    delay: Mutex<Option<Duration>>,
    app_calls: AtomicU32,
    tenant_calls: AtomicU32,
    refresh_history: Mutex<Vec<(String, String)>>,
    exchange_history: Mutex<Vec<String>>,
}

impl Default for MockIdentityClient {
    fn default() -> Self {
        Self {
            app_token: Mutex::new(("a-mock".to_string(), 7200)),
            tenant_token: Mutex::new(("t-mock".to_string(), 7200)),
            refresh_grants: Mutex::new(VecDeque::new()),
            exchange_grant: Mutex::new(None),
            next_error: Mutex::new(None),
            delay: Mutex::new(None),
            app_calls: AtomicU32::new(0),
            tenant_calls: AtomicU32::new(0),
            refresh_history: Mutex::new(Vec::new()),
            exchange_history: Mutex::new(Vec::new()),
        }
    }
}

impl MockIdentityClient {
    /// Create new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application token returned by every issuance.
    pub fn set_app_token(&self, token: impl Into<String>, lifetime_secs: u64) -> &Self {
        *lock(&self.app_token) = (token.into(), lifetime_secs);
        self
    }

    /// Set the tenant token returned by every issuance.
    pub fn set_tenant_token(&self, token: impl Into<String>, lifetime_secs: u64) -> &Self {
        *lock(&self.tenant_token) = (token.into(), lifetime_secs);
        self
    }

    /// Queue a refresh grant.
    pub fn queue_refresh_grant(&self, grant: UserTokenGrant) -> &Self {
        lock(&self.refresh_grants).push_back(grant);
        self
    }

    /// Set the code exchange grant.
    pub fn set_exchange_grant(&self, grant: UserTokenGrant) -> &Self {
        *lock(&self.exchange_grant) = Some(grant);
        self
    }

    /// Fail the next call with `error`.
    pub fn set_next_error(&self, error: AuthError) -> &Self {
        *lock(&self.next_error) = Some(error);
        self
    }

    /// Delay every call, to widen race windows in concurrency tests.
    pub fn set_delay(&self, delay: Duration) -> &Self {
        *lock(&self.delay) = Some(delay);
        self
    }

    pub fn app_calls(&self) -> u32 {
        self.app_calls.load(Ordering::SeqCst)
    }

    pub fn tenant_calls(&self) -> u32 {
        self.tenant_calls.load(Ordering::SeqCst)
    }

    /// `(refresh_token, app_token)` pairs presented to the refresh endpoint.
    pub fn get_refresh_history(&self) -> Vec<(String, String)> {
        lock(&self.refresh_history).clone()
    }

    /// Codes presented to the exchange endpoint.
    pub fn get_exchange_history(&self) -> Vec<String> {
        lock(&self.exchange_history).clone()
    }

    async fn before_call(&self) -> AuthResult<()> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.next_error).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn issued(slot: &Mutex<(String, u64)>) -> IssuedToken {
        let (token, lifetime_secs) = lock(slot).clone();
        IssuedToken {
            token: SecretString::new(token),
            lifetime_secs,
        }
    }
}

#[async_trait]
impl IdentityClient for MockIdentityClient {
    async fn request_app_token(&self) -> AuthResult<IssuedToken> {
        self.app_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        Ok(Self::issued(&self.app_token))
    }

    async fn request_tenant_token(&self) -> AuthResult<IssuedToken> {
        self.tenant_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        Ok(Self::issued(&self.tenant_token))
    }

    async fn refresh_user_token(
        &self,
        refresh_token: &str,
        app_token: &str,
    ) -> AuthResult<UserTokenGrant> {
        lock(&self.refresh_history).push((refresh_token.to_string(), app_token.to_string()));
        self.before_call().await?;

        let queued = lock(&self.refresh_grants).pop_front();
        Ok(queued.unwrap_or_else(|| {
            UserTokenGrant::new("u-mock", Some(refresh_token.to_string()), 7200)
        }))
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<UserTokenGrant> {
        lock(&self.exchange_history).push(code.to_string());
        self.before_call().await?;

        let grant = lock(&self.exchange_grant).clone();
        Ok(grant.unwrap_or_else(|| {
            UserTokenGrant::new("u-mock", Some("ur-mock".to_string()), 7200)
        }))
    }
}

/// Create mock identity client for testing.
pub fn create_mock_identity_client() -> MockIdentityClient {
    MockIdentityClient::new()
}
