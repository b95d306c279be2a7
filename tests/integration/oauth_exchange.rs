//! Integration tests for the OAuth bootstrap exchange

use super::*;
use feishu_calendar_auth::{
    AuthError, AuthorizationError, FeishuAuthClient, OAuthExchangeSettings,
};
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{body_json, method, path};
use wiremock::Mock;

fn test_settings() -> OAuthExchangeSettings {
    OAuthExchangeSettings {
        port: 0,
        close_grace: Duration::ZERO,
        ..OAuthExchangeSettings::default()
    }
}

async fn browser_get(url: String) -> (u16, String) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn test_denied_callback_releases_port() {
    let mock_server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(success_response(json!({"code": 0})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = FeishuAuthClient::new(config_for(&mock_server).build().unwrap()).unwrap();
    let pending = client.oauth_exchange(test_settings()).bind().await.unwrap();
    let addr = pending.local_addr();
    let waiter = tokio::spawn(pending.wait());

    let (status, body) = browser_get(format!(
        "http://{}/callback?error=access_denied&error_description=user%20cancelled",
        addr
    ))
    .await;
    assert_eq!(status, 200);
    assert!(body.contains("user cancelled"));

    let result = waiter.await.unwrap();
    match result {
        Err(AuthError::Authorization(AuthorizationError::AccessDenied { error, .. })) => {
            assert_eq!(error, "access_denied");
        }
        other => panic!("unexpected result {:?}", other),
    }

    TcpListener::bind(addr).await.unwrap();
}

#[tokio::test]
async fn test_code_exchange_success() {
    let mock_server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .and(body_json(json!({
            "app_id": "cli_test",
            "app_secret": "test-secret",
            "grant_type": "authorization_code",
            "code": "c-1"
        })))
        .respond_with(success_response(json!({
            "code": 0,
            "msg": "success",
            "data": {"access_token": "u-1", "refresh_token": "ur-1", "expires_in": 7200}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = FeishuAuthClient::new(config_for(&mock_server).build().unwrap()).unwrap();
    let pending = client.oauth_exchange(test_settings()).bind().await.unwrap();
    let addr = pending.local_addr();
    assert!(pending.authorization_url().contains("app_id=cli_test"));
    let waiter = tokio::spawn(pending.wait());

    let (status, index) = browser_get(format!("http://{}/", addr)).await;
    assert_eq!(status, 200);
    assert!(index.contains("/open-apis/authen/v1/authorize?app_id=cli_test"));

    let (status, _) = browser_get(format!("http://{}/callback", addr)).await;
    assert_eq!(status, 400);

    let (status, body) = browser_get(format!("http://{}/callback?code=c-1", addr)).await;
    assert_eq!(status, 200);
    assert!(body.contains("ur-1"));

    let tokens = waiter.await.unwrap().unwrap();
    assert_eq!(tokens.access_token, "u-1");
    assert_eq!(tokens.refresh_token, "ur-1");
    assert_eq!(tokens.expires_in, 7200);

    TcpListener::bind(addr).await.unwrap();
}

#[tokio::test]
async fn test_code_exchange_rejected() {
    let mock_server = setup_mock_server().await;
    Mock::given(method("POST"))
        .and(path(EXCHANGE_PATH))
        .respond_with(success_response(json!({"code": 20003, "msg": "invalid code"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = FeishuAuthClient::new(config_for(&mock_server).build().unwrap()).unwrap();
    let pending = client.oauth_exchange(test_settings()).bind().await.unwrap();
    let addr = pending.local_addr();
    let waiter = tokio::spawn(pending.wait());

    let (_, body) = browser_get(format!("http://{}/callback?code=stale", addr)).await;
    assert!(body.contains("invalid code"));

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        AuthError::Authorization(AuthorizationError::ExchangeFailed { code: 20003, .. })
    ));
}

#[tokio::test]
async fn test_port_in_use_is_listener_error() {
    let mock_server = setup_mock_server().await;
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    let client = FeishuAuthClient::new(config_for(&mock_server).build().unwrap()).unwrap();
    let settings = OAuthExchangeSettings {
        port,
        ..test_settings()
    };

    let err = client.oauth_exchange(settings).run().await.unwrap_err();
    assert!(matches!(err, AuthError::Listener(_)));
}
