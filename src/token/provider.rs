//! Token Provider
//!
//! Resolves a bearer token for a credential kind: cache first, then the issuer.
//! Each kind has its own single-flight guard, so concurrent callers that miss the
//! cache share one issuer round-trip.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as FlightGuard;

use super::store::CredentialStore;
use crate::core::transport::lock;
use crate::error::{AuthError, AuthResult, CredentialError};
use crate::flows::{IdentityClient, RefreshSession};
use crate::telemetry::{AuthLogContext, Logger, TracingLogger};
use crate::types::{expose, CredentialConfig, CredentialKind, TokenCacheEntry};

/// Receives refresh tokens superseded by the issuer.
///
/// The crate keeps the rotated value in memory only; persisting it is up to the
/// observer.
pub trait RefreshTokenObserver: Send + Sync {
    fn on_refresh_token_rotated(&self, refresh_token: &str);
}

/// Token provider.
pub struct TokenProvider<C: IdentityClient> {
    config: Mutex<CredentialConfig>,
    app_id: String,
    store: Mutex<CredentialStore>,
    app_flight: FlightGuard<()>,
    tenant_flight: FlightGuard<()>,
    user_flight: FlightGuard<()>,
    identity: Arc<C>,
    logger: Arc<dyn Logger>,
    observer: Option<Arc<dyn RefreshTokenObserver>>,
    rotation_hint_shown: AtomicBool,
}

impl<C: IdentityClient> TokenProvider<C> {
    /// Create new provider.
    pub fn new(config: CredentialConfig, identity: Arc<C>) -> Self {
        Self {
            app_id: config.app_id.clone(),
            config: Mutex::new(config),
            store: Mutex::new(CredentialStore::new()),
            app_flight: FlightGuard::new(()),
            tenant_flight: FlightGuard::new(()),
            user_flight: FlightGuard::new(()),
            identity,
            logger: Arc::new(TracingLogger::new()),
            observer: None,
            rotation_hint_shown: AtomicBool::new(false),
        }
    }

    /// Replace the logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Register the refresh-token rotation observer.
    pub fn with_observer(mut self, observer: Arc<dyn RefreshTokenObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Snapshot of the configuration, carrying any rotated refresh token.
    pub fn config(&self) -> CredentialConfig {
        lock(&self.config).clone()
    }

    pub fn identity(&self) -> &Arc<C> {
        &self.identity
    }

    pub(crate) fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Credential kind an outbound call must present.
    pub fn select_kind(&self, use_user_token: bool, app_token_mode: bool) -> CredentialKind {
        let has_user_credential = lock(&self.config).has_user_credential();
        CredentialKind::select(use_user_token, app_token_mode, has_user_credential)
    }

    /// Resolve a usable token for `kind`.
    pub async fn resolve(&self, kind: CredentialKind) -> AuthResult<String> {
        match kind {
            CredentialKind::Application => self.resolve_issued(kind).await,
            CredentialKind::Tenant => {
                // Rotated by whoever supplied it.
                let supplied = lock(&self.config)
                    .tenant_access_token
                    .as_ref()
                    .map(|t| expose(t).to_string());
                match supplied {
                    Some(token) => Ok(token),
                    None => self.resolve_issued(kind).await,
                }
            }
            CredentialKind::User => self.resolve_user().await,
        }
    }

    /// Drop the cached entry for `kind`.
    pub fn invalidate(&self, kind: CredentialKind) -> bool {
        let removed = self.store().invalidate(kind);
        if removed {
            self.logger
                .debug("cached token invalidated", &self.context("invalidate", kind));
        }
        removed
    }

    /// Drop every cached entry.
    pub fn reset(&self) {
        self.store().clear();
        self.logger.debug(
            "credential cache cleared",
            &AuthLogContext::new()
                .operation("reset")
                .app_id(&self.app_id),
        );
    }

    /// Invalidate, then resolve a fresh token for `kind`.
    pub async fn force_refresh(&self, kind: CredentialKind) -> AuthResult<String> {
        self.invalidate(kind);
        self.resolve(kind).await
    }

    /// Refresh token currently in effect, including any rotation.
    pub fn current_refresh_token(&self) -> Option<String> {
        lock(&self.config)
            .refresh_token
            .as_ref()
            .map(|t| expose(t).to_string())
    }

    /// Seed the cache with a token persisted by the caller.
    pub fn restore_entry(
        &self,
        kind: CredentialKind,
        token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) {
        self.store()
            .put_entry(kind, TokenCacheEntry::new(token, expires_at));
    }

    /// Expiry of the cached entry for `kind`, if any.
    pub fn cached_expiry(&self, kind: CredentialKind) -> Option<DateTime<Utc>> {
        self.store().entry(kind).map(|e| e.expires_at)
    }

    fn store(&self) -> MutexGuard<'_, CredentialStore> {
        lock(&self.store)
    }

    fn cached(&self, kind: CredentialKind) -> Option<String> {
        self.store().get(kind)
    }

    fn flight(&self, kind: CredentialKind) -> &FlightGuard<()> {
        match kind {
            CredentialKind::Application => &self.app_flight,
            CredentialKind::Tenant => &self.tenant_flight,
            CredentialKind::User => &self.user_flight,
        }
    }

    fn context(&self, operation: &str, kind: CredentialKind) -> AuthLogContext {
        AuthLogContext::new()
            .operation(operation)
            .kind(kind)
            .app_id(&self.app_id)
    }

    async fn resolve_issued(&self, kind: CredentialKind) -> AuthResult<String> {
        if let Some(token) = self.cached(kind) {
            return Ok(token);
        }

        let _flight = self.flight(kind).lock().await;
        if let Some(token) = self.cached(kind) {
            return Ok(token);
        }

        let context = self.context("issue_token", kind);
        self.logger.debug("requesting access token", &context);

        let result = match kind {
            CredentialKind::Application => self.identity.request_app_token().await,
            _ => self.identity.request_tenant_token().await,
        };
        let issued = result.map_err(|error| {
            self.logger.error(
                "access token request failed",
                &context.clone().extra("error_code", error.error_code()),
            );
            error
        })?;

        let token = expose(&issued.token).to_string();
        self.store().put(kind, token.clone(), issued.lifetime_secs);
        self.logger.info(
            "access token cached",
            &context.extra("lifetime_secs", issued.lifetime_secs.to_string()),
        );
        Ok(token)
    }

    async fn resolve_user(&self) -> AuthResult<String> {
        let supplied = {
            let config = lock(&self.config);
            match (&config.refresh_token, &config.user_access_token) {
                (None, Some(token)) => Some(expose(token).to_string()),
                _ => None,
            }
        };
        if let Some(token) = supplied {
            return Ok(token);
        }

        if let Some(token) = self.cached(CredentialKind::User) {
            return Ok(token);
        }

        if self.current_refresh_token().is_none() {
            return Err(AuthError::Credential(CredentialError::Missing {
                kind: CredentialKind::User,
                message: "no user access token or refresh token is configured".to_string(),
            }));
        }

        let _flight = self.user_flight.lock().await;
        if let Some(token) = self.cached(CredentialKind::User) {
            return Ok(token);
        }

        // Re-read under the guard: a rotation may have landed while waiting.
        let refresh_token = self.current_refresh_token().ok_or_else(|| {
            AuthError::Credential(CredentialError::Missing {
                kind: CredentialKind::User,
                message: "refresh token is no longer available".to_string(),
            })
        })?;
        let app_token = self.resolve_issued(CredentialKind::Application).await?;

        let mut session = RefreshSession::new(self.logger.as_ref());
        let outcome = session
            .run(self.identity.as_ref(), &refresh_token, &app_token)
            .await?;

        let access_token = outcome.grant.access_token.clone();
        self.store()
            .put(CredentialKind::User, access_token.clone(), outcome.grant.expires_in);

        if let Some(rotated) = outcome.rotated_refresh_token {
            self.apply_rotation(&rotated);
        }

        Ok(access_token)
    }

    fn apply_rotation(&self, rotated: &str) {
        lock(&self.config).refresh_token = Some(SecretString::new(rotated.to_string()));

        if let Some(observer) = &self.observer {
            observer.on_refresh_token_rotated(rotated);
        }

        if !self.rotation_hint_shown.swap(true, Ordering::SeqCst) {
            self.logger.warn(
                "refresh token rotated by the issuer; persist the new FEISHU_REFRESH_TOKEN value to survive restarts",
                &self.context("refresh_user_token", CredentialKind::User),
            );
        }
    }
}
