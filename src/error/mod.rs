//! Credential Error Types
//!
//! Error hierarchy for token acquisition, refresh and the OAuth bootstrap exchange.

use std::time::Duration;
use thiserror::Error;

use crate::types::CredentialKind;

/// Root error type for the credential subsystem.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Callback listener error: {0}")]
    Listener(#[from] ListenerError),
}

impl AuthError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "FEISHU_AUTH_CONFIG",
            Self::Credential(CredentialError::Missing { .. }) => "FEISHU_AUTH_MISSING_CREDENTIAL",
            Self::Credential(CredentialError::IssuanceFailed { .. }) => "FEISHU_AUTH_ISSUANCE",
            Self::Credential(CredentialError::RefreshFailed { .. }) => "FEISHU_AUTH_REFRESH",
            Self::Authorization(_) => "FEISHU_AUTH_AUTHORIZATION",
            Self::Network(_) => "FEISHU_AUTH_NETWORK",
            Self::Protocol(_) => "FEISHU_AUTH_PROTOCOL",
            Self::Listener(_) => "FEISHU_AUTH_LISTENER",
        }
    }

    /// Check if error is retryable.
    ///
    /// Only transport failures qualify. An issuer rejection repeats itself when
    /// replayed with the same secret, code or refresh token.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get retry-after duration if applicable.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Network(NetworkError::RateLimited { retry_after }) => {
                Some(Duration::from_secs(*retry_after as u64))
            }
            _ => None,
        }
    }

    /// Check if error requires re-running the OAuth exchange.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Credential(CredentialError::Missing {
                kind: CredentialKind::User,
                ..
            }) => true,
            Self::Credential(CredentialError::RefreshFailed { .. }) => true,
            Self::Authorization(AuthorizationError::AccessDenied { .. }) => true,
            _ => false,
        }
    }

    /// User-facing message.
    pub fn user_message(&self) -> String {
        get_user_message(self)
    }

    /// Issuer message carried by the error, if the issuer rejected the request.
    pub fn issuer_message(&self) -> Option<&str> {
        match self {
            Self::Credential(CredentialError::IssuanceFailed { message, .. })
            | Self::Credential(CredentialError::RefreshFailed { message, .. })
            | Self::Authorization(AuthorizationError::ExchangeFailed { message, .. }) => {
                Some(message.as_str())
            }
            _ => None,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },
}

/// Token acquisition error.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No usable {kind} credential: {message}")]
    Missing {
        kind: CredentialKind,
        message: String,
    },

    #[error("Failed to obtain {kind} access token: {message} (code {code})")]
    IssuanceFailed {
        kind: CredentialKind,
        code: i64,
        message: String,
    },

    #[error("User token refresh failed: {message} (code {code})")]
    RefreshFailed { code: i64, message: String },
}

/// OAuth bootstrap exchange error.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("Authorization denied: {error}")]
    AccessDenied {
        error: String,
        error_description: Option<String>,
    },

    #[error("Authorization code exchange failed: {message} (code {code})")]
    ExchangeFailed { code: i64, message: String },

    #[error("Authorization exchange cancelled before a callback arrived")]
    Cancelled,
}

/// Network/transport error.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("TLS error: {message}")]
    TlsError { message: String },

    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u32 },
}

impl NetworkError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::TlsError { .. })
    }
}

/// Protocol/response parsing error.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Unexpected redirect to: {location}")]
    UnexpectedRedirect { location: String },

    #[error("Response too large: {size} bytes")]
    ResponseTooLarge { size: usize },

    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },
}

/// Local callback listener error.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind callback listener on {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Failed to accept callback connection: {message}")]
    AcceptFailed { message: String },

    #[error("Callback connection I/O failed: {message}")]
    Io { message: String },
}

/// Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Get user-friendly error message.
pub fn get_user_message(error: &AuthError) -> String {
    match error {
        AuthError::Credential(CredentialError::Missing {
            kind: CredentialKind::User,
            ..
        }) => "No user credential is configured. Run the authorization helper to obtain a refresh token."
            .to_string(),
        AuthError::Credential(CredentialError::Missing { .. }) => {
            "Required credentials are not configured.".to_string()
        }
        AuthError::Credential(CredentialError::IssuanceFailed { message, .. }) => {
            format!("Feishu rejected the application credentials: {}", message)
        }
        AuthError::Credential(CredentialError::RefreshFailed { .. }) => {
            "Your Feishu session could not be renewed. Please authorize again.".to_string()
        }
        AuthError::Authorization(AuthorizationError::AccessDenied { .. }) => {
            "Access was denied. Please restart the authorization and grant calendar access."
                .to_string()
        }
        AuthError::Authorization(AuthorizationError::ExchangeFailed { message, .. }) => {
            format!("Could not complete authorization: {}", message)
        }
        AuthError::Network(NetworkError::Timeout { .. }) => {
            "The request timed out. Please check your connection and try again.".to_string()
        }
        AuthError::Listener(ListenerError::BindFailed { address, .. }) => format!(
            "Could not listen on {}. Make sure no other process is using this port.",
            address
        ),
        _ => "An authentication error occurred. Please try again.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(AuthError::Network(NetworkError::Timeout {
            timeout: Duration::from_secs(30)
        })
        .is_retryable());
        assert!(!AuthError::Network(NetworkError::TlsError {
            message: "bad cert".to_string()
        })
        .is_retryable());
        assert!(!AuthError::Credential(CredentialError::IssuanceFailed {
            kind: CredentialKind::Tenant,
            code: 99991663,
            message: "invalid app_secret".to_string(),
        })
        .is_retryable());
    }

    #[test]
    fn test_issuance_error_names_kind_and_message() {
        let error = AuthError::Credential(CredentialError::IssuanceFailed {
            kind: CredentialKind::Tenant,
            code: 99991663,
            message: "invalid app_secret".to_string(),
        });

        let rendered = error.to_string();
        assert!(rendered.contains("tenant"));
        assert!(rendered.contains("invalid app_secret"));
        assert_eq!(error.issuer_message(), Some("invalid app_secret"));
        assert_eq!(error.error_code(), "FEISHU_AUTH_ISSUANCE");
    }

    #[test]
    fn test_needs_reauth() {
        assert!(AuthError::Credential(CredentialError::RefreshFailed {
            code: 20037,
            message: "refresh token expired".to_string()
        })
        .needs_reauth());
        assert!(AuthError::Authorization(AuthorizationError::AccessDenied {
            error: "access_denied".to_string(),
            error_description: None,
        })
        .needs_reauth());
        assert!(!AuthError::Credential(CredentialError::Missing {
            kind: CredentialKind::Tenant,
            message: "no app secret".to_string(),
        })
        .needs_reauth());
    }

    #[test]
    fn test_retry_after() {
        let error = AuthError::Network(NetworkError::RateLimited { retry_after: 10 });
        assert_eq!(error.retry_after(), Some(Duration::from_secs(10)));

        let error = AuthError::Authorization(AuthorizationError::Cancelled);
        assert_eq!(error.retry_after(), None);
    }
}
