//! Telegram Bot API client tests against a mock HTTP server.
//!
//! ```bash
//! cargo test -p chanpass-subscriptions --features telegram --test telegram_api
//! ```

#![cfg(feature = "telegram")]

use chanpass_subscriptions::{
    ChannelPlatform, ChatId, MemberStatus, PlatformError, TelegramConfig, TelegramPlatform,
    UserId,
};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

const TOKEN: &str = "123456:test-token";
const CHANNEL: ChatId = ChatId(-1002842558712);

fn platform(server: &MockServer) -> TelegramPlatform {
    TelegramPlatform::new(TelegramConfig::new(TOKEN).with_api_url(server.uri())).unwrap()
}

fn endpoint(method_name: &str) -> String {
    format!("/bot{}/{}", TOKEN, method_name)
}

#[tokio::test]
async fn test_get_chat_member_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("getChatMember")))
        .and(body_partial_json(json!({ "chat_id": CHANNEL.0, "user_id": 42 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "status": "restricted", "user": { "id": 42, "is_bot": false, "first_name": "A" } }
        })))
        .mount(&server)
        .await;

    let status = platform(&server).member_status(CHANNEL, UserId(42)).await.unwrap();
    assert_eq!(status, MemberStatus::Restricted);
}

#[tokio::test]
async fn test_unknown_user_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("getChatMember")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: user not found"
        })))
        .mount(&server)
        .await;

    let err = platform(&server).member_status(CHANNEL, UserId(42)).await.unwrap_err();
    assert!(matches!(err, PlatformError::NotFound(_)));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("sendMessage")))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 12",
            "parameters": { "retry_after": 12 }
        })))
        .mount(&server)
        .await;

    let err = platform(&server)
        .send_message(ChatId(42), "hello")
        .await
        .unwrap_err();
    assert_eq!(err, PlatformError::RateLimited { retry_after_secs: 12 });
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unban_only_if_banned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("unbanChatMember")))
        .and(body_partial_json(json!({ "user_id": 42, "only_if_banned": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true })))
        .expect(1)
        .mount(&server)
        .await;

    platform(&server).unban_member(CHANNEL, UserId(42)).await.unwrap();
}

#[tokio::test]
async fn test_create_single_use_invite_link() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("createChatInviteLink")))
        .and(body_partial_json(json!({ "member_limit": 1, "expire_date": 1700086400 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {
                "invite_link": "https://t.me/+AbCdEf",
                "creator": { "id": 1, "is_bot": true, "first_name": "bot" },
                "creates_join_request": false,
                "is_primary": false,
                "is_revoked": false,
                "member_limit": 1,
                "expire_date": 1700086400
            }
        })))
        .mount(&server)
        .await;

    let link = platform(&server)
        .create_invite_link(CHANNEL, 1, 1_700_086_400)
        .await
        .unwrap();
    assert_eq!(link.url, "https://t.me/+AbCdEf");
    assert_eq!(link.member_limit, 1);
    assert_eq!(link.expire_at, 1_700_086_400);
}

#[tokio::test]
async fn test_bad_token_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let err = platform(&server).ban_member(CHANNEL, UserId(42)).await.unwrap_err();
    assert!(matches!(err, PlatformError::Api { code: 404, .. }));
}

#[tokio::test]
async fn test_garbage_success_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let err = platform(&server)
        .send_message(ChatId(42), "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::Decode(_)));
}
