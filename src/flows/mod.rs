//! Credential Flows
//!
//! Issuer interactions for the three credential kinds:
//!
//! - **Issuance**: application and tenant tokens from app credentials
//! - **Refresh**: user tokens from a refresh token
//! - **Authorization Code**: local redirect listener that bootstraps a refresh token

pub mod authorization_code;
pub mod issuance;
pub mod refresh;

// Issuance
pub use issuance::{
    create_mock_identity_client, DefaultIdentityClient, IdentityClient, MockIdentityClient,
};

// Refresh
pub use refresh::{RefreshOutcome, RefreshSession, RefreshState};

// Authorization Code
pub use authorization_code::{escape_html, ExchangeState, OAuthExchangeFlow, PendingExchange};
