//! Credential Types
//!
//! Core type definitions for token acquisition and the OAuth bootstrap exchange.

pub mod callback;
pub mod config;
pub mod token;

pub use callback::*;
pub use config::*;
pub use token::*;
