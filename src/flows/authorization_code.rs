//! Authorization Code Flow
//!
//! One-shot local redirect listener that bootstraps a user refresh token.
//!
//! The listener serves `GET /` (a page linking to the authorize endpoint) and
//! `GET /callback`. The first callback carrying a code or an error ends the exchange.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use url::Url;

use super::issuance::IdentityClient;
use crate::error::{
    AuthError, AuthResult, AuthorizationError, ConfigurationError, ListenerError,
};
use crate::telemetry::{AuthLogContext, Logger, TracingLogger};
use crate::types::{
    CallbackParams, CallbackRoute, CredentialConfig, OAuthExchangeSettings, OAuthTokens,
    AUTHORIZE_PATH,
};

const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HEADER_LINES: usize = 100;
const MAX_REQUEST_HEAD_BYTES: u64 = 8 * 1024;

/// Exchange state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    ListeningForCallback,
    CodeReceived,
    ErrorReceived,
    Exchanging,
    ExchangeSucceeded,
    ExchangeFailed,
    Closed,
}

impl ExchangeState {
    /// Check if the transition is allowed.
    pub fn can_transition_to(&self, next: ExchangeState) -> bool {
        use ExchangeState::*;
        matches!(
            (self, next),
            (Idle, ListeningForCallback)
                | (ListeningForCallback, CodeReceived)
                | (ListeningForCallback, ErrorReceived)
                | (CodeReceived, Exchanging)
                | (Exchanging, ExchangeSucceeded)
                | (Exchanging, ExchangeFailed)
                | (Idle, Closed)
                | (ListeningForCallback, Closed)
                | (ErrorReceived, Closed)
                | (CodeReceived, Closed)
                | (Exchanging, Closed)
                | (ExchangeSucceeded, Closed)
                | (ExchangeFailed, Closed)
        )
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ListeningForCallback => "listening_for_callback",
            Self::CodeReceived => "code_received",
            Self::ErrorReceived => "error_received",
            Self::Exchanging => "exchanging",
            Self::ExchangeSucceeded => "exchange_succeeded",
            Self::ExchangeFailed => "exchange_failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// OAuth bootstrap exchange.
pub struct OAuthExchangeFlow<C: IdentityClient> {
    identity: Arc<C>,
    app_id: String,
    authorize_endpoint: String,
    settings: OAuthExchangeSettings,
    logger: Arc<dyn Logger>,
}

impl<C: IdentityClient> OAuthExchangeFlow<C> {
    /// Create new exchange flow.
    pub fn new(identity: Arc<C>, config: &CredentialConfig, settings: OAuthExchangeSettings) -> Self {
        Self {
            identity,
            app_id: config.app_id.clone(),
            authorize_endpoint: config.endpoint(AUTHORIZE_PATH),
            settings,
            logger: Arc::new(TracingLogger::new()),
        }
    }

    /// Replace the logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn settings(&self) -> &OAuthExchangeSettings {
        &self.settings
    }

    /// Browser-facing authorization URL for `redirect_uri`.
    pub fn authorization_url(&self, redirect_uri: &str) -> AuthResult<String> {
        let mut url = Url::parse(&self.authorize_endpoint).map_err(|_| {
            AuthError::Configuration(ConfigurationError::InvalidEndpoint {
                url: self.authorize_endpoint.clone(),
            })
        })?;
        url.query_pairs_mut()
            .append_pair("app_id", &self.app_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.settings.scope);
        Ok(url.to_string())
    }

    /// Bind the local listener.
    pub async fn bind(&self) -> AuthResult<PendingExchange<C>> {
        let address = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = TcpListener::bind((self.settings.host.as_str(), self.settings.port))
            .await
            .map_err(|e| {
                AuthError::Listener(ListenerError::BindFailed {
                    address: address.clone(),
                    message: e.to_string(),
                })
            })?;
        let local_addr = listener.local_addr().map_err(|e| {
            AuthError::Listener(ListenerError::BindFailed {
                address,
                message: e.to_string(),
            })
        })?;

        let redirect_uri = self.settings.redirect_uri(local_addr.port());
        let authorization_url = self.authorization_url(&redirect_uri)?;

        let context = AuthLogContext::new()
            .operation("oauth_exchange")
            .app_id(&self.app_id);
        self.logger.info(
            "authorization listener ready",
            &context
                .clone()
                .extra("listen", local_addr.to_string())
                .extra("authorization_url", authorization_url.clone()),
        );

        Ok(PendingExchange {
            identity: Arc::clone(&self.identity),
            logger: Arc::clone(&self.logger),
            context,
            close_grace: self.settings.close_grace,
            listener,
            local_addr,
            redirect_uri,
            authorization_url,
            state: ExchangeState::Idle,
        })
    }

    /// Bind and wait for the exchange to finish.
    pub async fn run(&self) -> AuthResult<OAuthTokens> {
        self.bind().await?.wait().await
    }

    /// Like [`run`](Self::run), giving up when `shutdown` completes first.
    pub async fn run_until<F>(&self, shutdown: F) -> AuthResult<OAuthTokens>
    where
        F: Future<Output = ()>,
    {
        self.bind().await?.wait_until(shutdown).await
    }
}

enum ConnectionOutcome {
    KeepListening,
    Finished(AuthResult<OAuthTokens>),
}

/// A bound listener waiting for the authorization redirect.
///
/// Owns the listener; it is released when the exchange finishes, fails or is
/// cancelled, whichever comes first.
pub struct PendingExchange<C: IdentityClient> {
    identity: Arc<C>,
    logger: Arc<dyn Logger>,
    context: AuthLogContext,
    close_grace: Duration,
    listener: TcpListener,
    local_addr: SocketAddr,
    redirect_uri: String,
    authorization_url: String,
    state: ExchangeState,
}

impl<C: IdentityClient> PendingExchange<C> {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URI registered for the bound port.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// URL the user opens to grant access.
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// Local page that links to the authorization URL.
    pub fn index_url(&self) -> String {
        format!("{}/", self.redirect_uri.trim_end_matches("/callback"))
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Wait for the callback and complete the exchange.
    pub async fn wait(self) -> AuthResult<OAuthTokens> {
        self.wait_until(std::future::pending()).await
    }

    /// Wait for the callback, or stop when `shutdown` completes.
    pub async fn wait_until<F>(mut self, shutdown: F) -> AuthResult<OAuthTokens>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let served = tokio::select! {
            result = self.serve() => Some(result),
            _ = &mut shutdown => None,
        };

        let result = served.unwrap_or_else(|| {
            self.logger
                .warn("authorization exchange cancelled", &self.context);
            Err(AuthError::Authorization(AuthorizationError::Cancelled))
        });

        self.transition(ExchangeState::Closed);
        drop(self.listener);
        result
    }

    fn transition(&mut self, next: ExchangeState) {
        if self.state == next {
            return;
        }
        debug_assert!(self.state.can_transition_to(next));
        self.logger.debug(
            &format!("exchange state {} -> {}", self.state, next),
            &self.context,
        );
        self.state = next;
    }

    async fn serve(&mut self) -> AuthResult<OAuthTokens> {
        self.transition(ExchangeState::ListeningForCallback);

        // Request heads are read concurrently so an idle connection (a browser
        // preconnect, say) cannot hold up the callback behind it.
        let mut reads = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(|e| {
                        AuthError::Listener(ListenerError::AcceptFailed {
                            message: e.to_string(),
                        })
                    })?;
                    reads.spawn(read_request(stream, peer));
                }
                Some(joined) = reads.join_next(), if !reads.is_empty() => {
                    let (mut stream, peer, request_line) = match joined {
                        Ok(read) => read,
                        Err(error) => {
                            self.logger.warn(
                                "callback reader task failed",
                                &self.context.clone().extra("error", error.to_string()),
                            );
                            continue;
                        }
                    };

                    let outcome = match request_line {
                        Ok(line) => self.respond(&mut stream, &line).await,
                        Err(error) => Err(error),
                    };

                    match outcome {
                        Ok(ConnectionOutcome::KeepListening) => {}
                        Ok(ConnectionOutcome::Finished(result)) => return result,
                        Err(error) => {
                            self.logger.warn(
                                "dropped callback connection",
                                &self
                                    .context
                                    .clone()
                                    .extra("peer", peer.to_string())
                                    .extra("error", error.to_string()),
                            );
                        }
                    }
                }
            }
        }
    }

    async fn respond(
        &mut self,
        stream: &mut TcpStream,
        request_line: &str,
    ) -> AuthResult<ConnectionOutcome> {
        match CallbackRoute::from_request_line(request_line) {
            CallbackRoute::Index => {
                let body = index_page(&self.authorization_url);
                write_response(stream, 200, "OK", &body).await?;
                Ok(ConnectionOutcome::KeepListening)
            }
            CallbackRoute::NotFound => {
                write_response(stream, 404, "Not Found", &message_page("Not found", "")).await?;
                Ok(ConnectionOutcome::KeepListening)
            }
            CallbackRoute::Callback(params) => self.handle_callback(stream, params).await,
        }
    }

    async fn handle_callback(
        &mut self,
        stream: &mut TcpStream,
        params: CallbackParams,
    ) -> AuthResult<ConnectionOutcome> {
        if let Some(error) = params.error {
            self.transition(ExchangeState::ErrorReceived);
            self.logger.warn(
                "authorization denied",
                &self.context.clone().extra("error", error.clone()),
            );
            let detail = params.error_description.as_deref().unwrap_or(&error);
            let body = message_page("Authorization failed", detail);
            // The outcome is already decided; a failed write changes nothing.
            let _ = write_response(stream, 200, "OK", &body).await;
            return Ok(ConnectionOutcome::Finished(Err(AuthError::Authorization(
                AuthorizationError::AccessDenied {
                    error,
                    error_description: params.error_description,
                },
            ))));
        }

        let code = match params.code.filter(|c| !c.is_empty()) {
            Some(code) => code,
            None => {
                let body = message_page("Bad request", "The callback carried no authorization code.");
                write_response(stream, 400, "Bad Request", &body).await?;
                return Ok(ConnectionOutcome::KeepListening);
            }
        };

        self.transition(ExchangeState::CodeReceived);
        self.transition(ExchangeState::Exchanging);

        match self.identity.exchange_code(&code).await {
            Ok(grant) => {
                self.transition(ExchangeState::ExchangeSucceeded);
                let tokens = OAuthTokens {
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token.unwrap_or_default(),
                    expires_in: grant.expires_in,
                };
                self.logger.info("authorization code exchanged", &self.context);

                let _ = write_response(stream, 200, "OK", &success_page(&tokens.refresh_token)).await;
                let _ = stream.shutdown().await;
                if !self.close_grace.is_zero() {
                    tokio::time::sleep(self.close_grace).await;
                }
                Ok(ConnectionOutcome::Finished(Ok(tokens)))
            }
            Err(error) => {
                self.transition(ExchangeState::ExchangeFailed);
                self.logger.error(
                    "authorization code exchange failed",
                    &self.context.clone().extra("error_code", error.error_code()),
                );
                let detail = error.issuer_message().map(str::to_string).unwrap_or_else(|| error.to_string());
                let _ = write_response(stream, 200, "OK", &message_page("Authorization failed", &detail)).await;
                Ok(ConnectionOutcome::Finished(Err(error)))
            }
        }
    }
}

fn listener_io(message: impl Into<String>) -> AuthError {
    AuthError::Listener(ListenerError::Io {
        message: message.into(),
    })
}

async fn read_request(
    mut stream: TcpStream,
    peer: SocketAddr,
) -> (TcpStream, SocketAddr, AuthResult<String>) {
    let request_line = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_line(&mut stream))
        .await
        .unwrap_or_else(|_| Err(listener_io("timed out reading request")));
    (stream, peer, request_line)
}

async fn read_request_line(stream: &mut TcpStream) -> AuthResult<String> {
    let mut reader = BufReader::new(stream.take(MAX_REQUEST_HEAD_BYTES));
    let mut request_line = String::new();
    let mut line = String::new();

    for _ in 0..MAX_HEADER_LINES {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| listener_io(e.to_string()))?;
        if read == 0 {
            if reader.get_ref().limit() == 0 {
                return Err(listener_io("request head too large"));
            }
            break;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        // Headers end at the first empty line.
        if trimmed.is_empty() {
            break;
        }
        if request_line.is_empty() {
            request_line = trimmed.to_string();
        }
    }

    Ok(request_line)
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    body: &str,
) -> AuthResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| listener_io(e.to_string()))?;
    stream.flush().await.map_err(|e| listener_io(e.to_string()))
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{title}</title>\n\
         <style>body {{ font-family: -apple-system, sans-serif; max-width: 500px; margin: 50px auto; \
         padding: 20px; text-align: center; }} code {{ word-break: break-all; }}</style>\n\
         </head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
        body = body
    )
}

fn index_page(authorization_url: &str) -> String {
    page(
        "Feishu Calendar Authorization",
        &format!(
            "<h1>Feishu Calendar Authorization</h1>\n<p>Grant calendar access to continue.</p>\n\
             <a href=\"{}\">Authorize</a>",
            escape_html(authorization_url)
        ),
    )
}

fn success_page(refresh_token: &str) -> String {
    page(
        "Authorization succeeded",
        &format!(
            "<h1>Authorization succeeded</h1>\n<p>Your refresh token:</p>\n<code>{}</code>\n\
             <p>Add it to your configuration as FEISHU_REFRESH_TOKEN. You can close this page.</p>",
            escape_html(refresh_token)
        ),
    )
}

fn message_page(title: &str, detail: &str) -> String {
    page(
        title,
        &format!(
            "<h1>{}</h1>\n<p>{}</p>\n<p><a href=\"/\">Start over</a></p>",
            escape_html(title),
            escape_html(detail)
        ),
    )
}
