//! Builders
//!
//! Fluent builder for credential configuration.

pub mod config;

pub use config::{credential_config, CredentialConfigBuilder};
