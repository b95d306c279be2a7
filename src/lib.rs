//! Feishu Calendar Credentials
//!
//! Token acquisition and refresh for the Feishu (Lark) calendar API.
//!
//! # Features
//!
//! - Application and tenant access tokens from app credentials, cached with a
//!   five-minute safety margin
//! - User access tokens minted from a refresh token, with rotation tracking
//! - Per-kind single-flight issuance under concurrent callers
//! - Local OAuth redirect listener that bootstraps a refresh token
//! - Authorization header construction for calendar calls
//!
//! # Example
//!
//! ```rust,ignore
//! use feishu_calendar_auth::{credential_config, FeishuAuthClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = credential_config()
//!         .app_id("cli_a1b2c3")
//!         .app_secret("app-secret")
//!         .refresh_token("ur-...")
//!         .build()?;
//!
//!     let client = FeishuAuthClient::new(config)?;
//!
//!     // User token, refreshed on demand.
//!     let headers = client.auth_headers(true).await?;
//!     println!("{:?}", headers.keys());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: credential kinds, cache entries, configuration
//! - `error`: error hierarchy
//! - `core`: HTTP transport and issuer response decoding
//! - `flows`: issuance, refresh and the OAuth bootstrap exchange
//! - `token`: credential store and token provider
//! - `resilience`: retry for idempotent issuance calls
//! - `telemetry`: structured logging
//! - `builders`: fluent configuration builder
//! - `client`: high-level client combining all of the above

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod flows;
pub mod resilience;
pub mod telemetry;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{build_auth_headers, feishu_auth_client_from_env, FeishuAuthClient};

// Re-export builders
pub use builders::{credential_config, CredentialConfigBuilder};

// Re-export errors
pub use error::{
    get_user_message, AuthError, AuthResult, AuthorizationError, ConfigurationError,
    CredentialError, ListenerError, NetworkError, ProtocolError,
};

// Re-export types
pub use types::{
    // Config
    AuthMode, CredentialConfig, OAuthExchangeSettings,
    // Token
    CredentialKind, IssuedToken, OAuthTokens, TokenCacheEntry, UserTokenGrant,
    EXPIRY_SAFETY_MARGIN_SECS,
    // Callback
    CallbackParams, CallbackRoute,
};

// Re-export core components
pub use crate::core::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, IssuerEnvelope, MockHttpTransport,
    ReqwestHttpTransport,
};

// Re-export flows
pub use flows::{
    DefaultIdentityClient, ExchangeState, IdentityClient, MockIdentityClient, OAuthExchangeFlow,
    PendingExchange, RefreshOutcome, RefreshSession, RefreshState,
};

// Re-export token management
pub use token::{CredentialStore, RefreshTokenObserver, TokenProvider};

// Re-export resilience
pub use resilience::{
    create_retry_executor, IssuanceRetryExecutor, RetryConfig, RetryExecutor,
    DEFAULT_RETRY_CONFIG,
};

// Re-export telemetry
pub use telemetry::{
    create_in_memory_logger, create_tracing_logger, no_op_logger, AuthLogContext,
    InMemoryLogger, LogEntry, LogLevel, Logger, NoOpLogger, TracingLogger,
};
