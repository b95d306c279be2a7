//! Integration tests using WireMock
//!
//! These tests drive the credential client against a mock Feishu identity server
//! and exercise the local OAuth redirect listener over real sockets.

mod oauth_exchange;
mod token_resolution;

use feishu_calendar_auth::{credential_config, CredentialConfigBuilder};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const APP_TOKEN_PATH: &str = "/open-apis/auth/v3/app_access_token/internal";
pub const TENANT_TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
pub const REFRESH_PATH: &str = "/open-apis/authen/v1/oidc/refresh_access_token";
pub const EXCHANGE_PATH: &str = "/open-apis/authen/v1/oidc/access_token";

/// Helper to create a mock identity server
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Builder pointed at the mock server with test app credentials
pub fn config_for(server: &MockServer) -> CredentialConfigBuilder {
    credential_config()
        .app_id("cli_test")
        .app_secret("test-secret")
        .api_base_url(server.uri())
}

/// Helper to create success response templates
pub fn success_response(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

/// Mock for the application token endpoint, expecting app credentials
pub fn app_token_mock(token: &str, expire: u64) -> Mock {
    Mock::given(method("POST"))
        .and(path(APP_TOKEN_PATH))
        .and(body_json(json!({"app_id": "cli_test", "app_secret": "test-secret"})))
        .respond_with(success_response(json!({
            "code": 0,
            "msg": "ok",
            "app_access_token": token,
            "expire": expire
        })))
}
