//! Token Management
//!
//! Credential caching and resolution.
//!
//! - **Credential Store**: one cache entry per credential kind
//! - **Token Provider**: cache-first resolution with single-flight issuance and refresh

pub mod provider;
pub mod store;

pub use provider::{RefreshTokenObserver, TokenProvider};
pub use store::CredentialStore;
