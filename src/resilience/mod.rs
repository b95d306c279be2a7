//! Resilience
//!
//! Exponential backoff retry for application and tenant token issuance.

pub mod retry;

pub use retry::{
    create_retry_executor, IssuanceRetryExecutor, RetryConfig, RetryExecutor,
    DEFAULT_RETRY_CONFIG,
};
