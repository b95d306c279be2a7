//! Integration tests for token resolution and header building

use super::*;
use feishu_calendar_auth::{AuthError, CredentialError, CredentialKind, FeishuAuthClient};
use secrecy::ExposeSecret;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::Mock;

#[tokio::test]
async fn test_app_mode_headers_issue_once() {
    let mock_server = setup_mock_server().await;
    app_token_mock("a-1", 7200)
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server)
        .use_app_token(true)
        .user_id("ou_123")
        .build()
        .unwrap();
    let client = FeishuAuthClient::new(config).unwrap();

    for use_user_token in [true, false] {
        let headers = client.auth_headers(use_user_token).await.unwrap();
        assert_eq!(headers["Authorization"], "Bearer a-1");
        assert_eq!(headers["Content-Type"], "application/json");
    }
    assert_eq!(client.acting_user_query().len(), 2);
}

#[tokio::test]
async fn test_refresh_once_then_cached() {
    let mock_server = setup_mock_server().await;
    app_token_mock("a-1", 7200)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(header("authorization", "Bearer a-1"))
        .and(body_json(json!({"grant_type": "refresh_token", "refresh_token": "ur-1"})))
        .respond_with(success_response(json!({
            "code": 0,
            "msg": "success",
            "data": {
                "access_token": "u-1",
                "refresh_token": "ur-1",
                "expires_in": 7200,
                "refresh_expires_in": 2592000,
                "token_type": "Bearer"
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server).refresh_token("ur-1").build().unwrap();
    let client = FeishuAuthClient::new(config).unwrap();

    for _ in 0..2 {
        let headers = client.auth_headers(true).await.unwrap();
        assert_eq!(headers["Authorization"], "Bearer u-1");
    }
    assert_eq!(client.provider().current_refresh_token().as_deref(), Some("ur-1"));
}

#[tokio::test]
async fn test_refresh_token_rotation() {
    let mock_server = setup_mock_server().await;
    app_token_mock("a-1", 7200).mount(&mock_server).await;

    for (presented, access, rotated) in [("ur-1", "u-1", "ur-2"), ("ur-2", "u-2", "ur-3")] {
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(json!({"grant_type": "refresh_token", "refresh_token": presented})))
            .respond_with(success_response(json!({
                "code": 0,
                "data": {"access_token": access, "refresh_token": rotated, "expires_in": 7200}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let config = config_for(&mock_server).refresh_token("ur-1").build().unwrap();
    let client = FeishuAuthClient::new(config).unwrap();

    assert_eq!(client.token(CredentialKind::User).await.unwrap(), "u-1");
    assert_eq!(client.provider().current_refresh_token().as_deref(), Some("ur-2"));

    let refreshed = client
        .provider()
        .force_refresh(CredentialKind::User)
        .await
        .unwrap();
    assert_eq!(refreshed, "u-2");
    assert_eq!(client.provider().current_refresh_token().as_deref(), Some("ur-3"));
    let persisted = client.config().refresh_token.map(|t| t.expose_secret().clone());
    assert_eq!(persisted.as_deref(), Some("ur-3"));
}

#[tokio::test]
async fn test_refresh_rejection_keeps_refresh_token() {
    let mock_server = setup_mock_server().await;
    app_token_mock("a-1", 7200).mount(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(success_response(json!({"code": 20037, "msg": "refresh token expired"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server).refresh_token("ur-1").build().unwrap();
    let client = FeishuAuthClient::new(config).unwrap();

    let err = client.auth_headers(true).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Credential(CredentialError::RefreshFailed { code: 20037, .. })
    ));
    assert!(err.needs_reauth());
    assert_eq!(client.provider().current_refresh_token().as_deref(), Some("ur-1"));
}

#[tokio::test]
async fn test_tenant_rejection_names_kind_and_message() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path(TENANT_TOKEN_PATH))
        .respond_with(success_response(json!({"code": 99991663, "msg": "invalid app_secret"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server).build().unwrap();
    let client = FeishuAuthClient::new(config).unwrap();

    let err = client.auth_headers(false).await.unwrap_err();
    match &err {
        AuthError::Credential(CredentialError::IssuanceFailed { kind, code, message }) => {
            assert_eq!(*kind, CredentialKind::Tenant);
            assert_eq!(*code, 99991663);
            assert_eq!(message, "invalid app_secret");
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().contains("invalid app_secret"));
}

#[tokio::test]
async fn test_tenant_token_in_data_envelope() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path(TENANT_TOKEN_PATH))
        .respond_with(success_response(json!({
            "code": 0,
            "msg": "ok",
            "data": {"tenant_access_token": "t-1", "expire": 7200}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server).build().unwrap();
    let client = FeishuAuthClient::new(config).unwrap();

    assert_eq!(client.token(CredentialKind::Tenant).await.unwrap(), "t-1");
    assert_eq!(client.token(CredentialKind::Tenant).await.unwrap(), "t-1");
}

#[tokio::test]
async fn test_missing_token_field_is_issuance_failure() {
    let mock_server = setup_mock_server().await;

    Mock::given(method("POST"))
        .and(path(APP_TOKEN_PATH))
        .respond_with(success_response(json!({"code": 0, "msg": "ok", "expire": 7200})))
        .mount(&mock_server)
        .await;

    let config = config_for(&mock_server).build().unwrap();
    let client = FeishuAuthClient::new(config).unwrap();

    let err = client.token(CredentialKind::Application).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::Credential(CredentialError::IssuanceFailed {
            kind: CredentialKind::Application,
            ..
        })
    ));
}
