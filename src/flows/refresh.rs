//! Refresh Sub-Protocol
//!
//! Exchanges a refresh token for a fresh user access token.

use std::fmt;

use super::issuance::IdentityClient;
use crate::error::AuthResult;
use crate::telemetry::{AuthLogContext, Logger};
use crate::types::{CredentialKind, UserTokenGrant};

/// Refresh state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh token configured; refresh is impossible.
    NoRefreshToken,
    /// Exchange in flight.
    Refreshing,
    /// New access token obtained.
    Refreshed,
    /// Issuer rejected the exchange. The stale refresh token is kept.
    RefreshFailed,
}

impl RefreshState {
    /// Check if the transition is allowed.
    pub fn can_transition_to(&self, next: RefreshState) -> bool {
        matches!(
            (self, next),
            (Self::NoRefreshToken, Self::Refreshing)
                | (Self::Refreshing, Self::Refreshed)
                | (Self::Refreshing, Self::RefreshFailed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refreshed | Self::RefreshFailed)
    }
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoRefreshToken => "no_refresh_token",
            Self::Refreshing => "refreshing",
            Self::Refreshed => "refreshed",
            Self::RefreshFailed => "refresh_failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The grant returned by the issuer.
    pub grant: UserTokenGrant,
    /// Replacement refresh token, when the issuer rotated it.
    pub rotated_refresh_token: Option<String>,
}

/// One run of the refresh sub-protocol.
pub struct RefreshSession<'a> {
    state: RefreshState,
    logger: &'a dyn Logger,
    context: AuthLogContext,
}

impl<'a> RefreshSession<'a> {
    pub fn new(logger: &'a dyn Logger) -> Self {
        Self {
            state: RefreshState::NoRefreshToken,
            logger,
            context: AuthLogContext::new()
                .operation("refresh_user_token")
                .kind(CredentialKind::User),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    fn transition(&mut self, next: RefreshState) {
        debug_assert!(self.state.can_transition_to(next));
        self.logger.debug(
            &format!("refresh state {} -> {}", self.state, next),
            &self.context,
        );
        self.state = next;
    }

    /// Present `refresh_token` to the issuer, authenticated by `app_token`.
    ///
    /// Never retries: a rejected refresh token stays rejected.
    pub async fn run<C>(
        &mut self,
        identity: &C,
        refresh_token: &str,
        app_token: &str,
    ) -> AuthResult<RefreshOutcome>
    where
        C: IdentityClient + ?Sized,
    {
        self.transition(RefreshState::Refreshing);

        match identity.refresh_user_token(refresh_token, app_token).await {
            Ok(grant) => {
                self.transition(RefreshState::Refreshed);
                let rotated_refresh_token = grant
                    .refresh_token
                    .as_ref()
                    .filter(|t| !t.is_empty() && t.as_str() != refresh_token)
                    .cloned();
                self.logger.info(
                    "user access token refreshed",
                    &self
                        .context
                        .clone()
                        .extra("expires_in", grant.expires_in.to_string())
                        .extra("rotated", rotated_refresh_token.is_some().to_string()),
                );
                Ok(RefreshOutcome {
                    grant,
                    rotated_refresh_token,
                })
            }
            Err(error) => {
                self.transition(RefreshState::RefreshFailed);
                self.logger.error(
                    "user token refresh failed",
                    &self
                        .context
                        .clone()
                        .extra("error_code", error.error_code()),
                );
                Err(error)
            }
        }
    }
}
