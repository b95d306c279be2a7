//! Retry Logic
//!
//! Exponential backoff retry with jitter for token issuance calls.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::error::{AuthError, NetworkError};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        DEFAULT_RETRY_CONFIG
    }
}

impl RetryConfig {
    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Default retry configuration.
pub const DEFAULT_RETRY_CONFIG: RetryConfig = RetryConfig {
    max_attempts: 3,
    initial_delay: Duration::from_millis(100),
    max_delay: Duration::from_secs(10),
    multiplier: 2.0,
    jitter: 0.1,
};

/// Retry executor interface.
#[async_trait]
pub trait RetryExecutor: Send + Sync {
    /// Execute an operation with retry logic.
    async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, AuthError>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, AuthError>> + Send;
}

/// Backoff retry executor for issuer calls.
pub struct IssuanceRetryExecutor {
    config: RetryConfig,
}

impl IssuanceRetryExecutor {
    /// Create new retry executor.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    fn calculate_delay(&self, attempt: u32, error: &AuthError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after.min(self.config.max_delay);
        }

        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.config.max_delay.as_millis() as f64);

        let jitter_range = capped_delay * self.config.jitter;
        let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for IssuanceRetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[async_trait]
impl RetryExecutor for IssuanceRetryExecutor {
    async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, AuthError>
    where
        T: Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, AuthError>> + Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    // Issuer rejections are final; only transport failures retry.
                    if !error.is_retryable() || attempt == max_attempts - 1 {
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt, &error);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying issuer request"
                    );
                    last_error = Some(error);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AuthError::Network(NetworkError::ConnectionFailed {
                message: "retry attempts exhausted".to_string(),
            })
        }))
    }
}

/// Create retry executor.
pub fn create_retry_executor(config: RetryConfig) -> IssuanceRetryExecutor {
    IssuanceRetryExecutor::new(config)
}
