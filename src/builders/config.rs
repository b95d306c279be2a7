//! Configuration Builder
//!
//! Fluent builder for credential configuration.

use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::error::{AuthError, ConfigurationError};
use crate::types::CredentialConfig;

/// Credential configuration builder.
#[derive(Default)]
pub struct CredentialConfigBuilder {
    app_id: Option<String>,
    app_secret: Option<SecretString>,
    tenant_access_token: Option<SecretString>,
    user_access_token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    use_app_token: bool,
    user_id: Option<String>,
    api_base_url: Option<String>,
    timeout: Option<Duration>,
}

impl CredentialConfigBuilder {
    /// Create new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set application ID.
    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    /// Set application secret.
    pub fn app_secret(mut self, app_secret: impl Into<String>) -> Self {
        self.app_secret = Some(SecretString::new(app_secret.into()));
        self
    }

    /// Use an externally managed tenant token instead of fetching one.
    pub fn tenant_access_token(mut self, token: impl Into<String>) -> Self {
        self.tenant_access_token = Some(SecretString::new(token.into()));
        self
    }

    /// Use an externally managed user token.
    pub fn user_access_token(mut self, token: impl Into<String>) -> Self {
        self.user_access_token = Some(SecretString::new(token.into()));
        self
    }

    /// Set the user refresh token.
    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::new(token.into()));
        self
    }

    /// Act with the application token.
    pub fn use_app_token(mut self, enable: bool) -> Self {
        self.use_app_token = enable;
        self
    }

    /// Open id of the user to act for in application-token mode.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Override the API base URL (e.g. `https://open.larksuite.com`).
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Set HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<CredentialConfig, AuthError> {
        let app_id = self.app_id.filter(|id| !id.trim().is_empty()).ok_or_else(|| {
            AuthError::Configuration(ConfigurationError::MissingRequired {
                field: "app_id".to_string(),
            })
        })?;

        let app_secret = self.app_secret.ok_or_else(|| {
            AuthError::Configuration(ConfigurationError::MissingRequired {
                field: "app_secret".to_string(),
            })
        })?;

        if let Some(base) = &self.api_base_url {
            let valid = Url::parse(base)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
                .unwrap_or(false);
            if !valid {
                return Err(AuthError::Configuration(ConfigurationError::InvalidEndpoint {
                    url: base.clone(),
                }));
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(AuthError::Configuration(ConfigurationError::InvalidConfig {
                    message: "timeout must be greater than zero".to_string(),
                }));
            }
        }

        let mut config = CredentialConfig::new(app_id, String::new());
        config.app_secret = app_secret;
        config.tenant_access_token = self.tenant_access_token;
        config.user_access_token = self.user_access_token;
        config.refresh_token = self.refresh_token;
        config.use_app_token = self.use_app_token;
        config.user_id = self.user_id;
        config.api_base_url = self.api_base_url;
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        Ok(config)
    }
}

/// Create a new credential configuration builder.
pub fn credential_config() -> CredentialConfigBuilder {
    CredentialConfigBuilder::new()
}
