//! Core Components
//!
//! HTTP transport and issuer response decoding.

pub mod envelope;
pub mod transport;

pub use envelope::IssuerEnvelope;
pub use transport::*;
