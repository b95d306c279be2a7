//! Callback Types
//!
//! Requests arriving at the local OAuth redirect listener.

use url::Url;

/// Callback parameters from the authorization redirect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code (if success).
    pub code: Option<String>,
    /// Error code (if authorization failed).
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse callback parameters from URL.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        params
    }
}

/// Route of one request received by the redirect listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackRoute {
    /// `GET /`: the page linking to the authorize endpoint.
    Index,
    /// `GET /callback?...`
    Callback(CallbackParams),
    /// Anything else (favicon probes and the like).
    NotFound,
}

impl CallbackRoute {
    /// Route an HTTP request line such as `GET /callback?code=abc HTTP/1.1`.
    pub fn from_request_line(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default();

        if method != "GET" {
            return Self::NotFound;
        }

        let url = match Url::parse("http://localhost").and_then(|base| base.join(target)) {
            Ok(url) => url,
            Err(_) => return Self::NotFound,
        };

        match url.path() {
            "/" => Self::Index,
            "/callback" => Self::Callback(CallbackParams::from_url(&url)),
            _ => Self::NotFound,
        }
    }
}
