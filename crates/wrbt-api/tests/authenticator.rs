//! Bearer-token authentication, tier checks and request auditing.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;
use wrbt_common::crypto;

#[tokio::test]
async fn missing_or_malformed_credentials_are_unauthorized_and_not_audited() {
    let app = TestApp::new();

    let none = app.send(Method::GET, "/api/v1/bots/me", None, None).await;
    assert_eq!(none.status, StatusCode::UNAUTHORIZED);
    assert_eq!(none.body["error"], "UNAUTHORIZED");

    let malformed = app
        .send(Method::GET, "/api/v1/bots/me", Some("not-a-wrbt-token"), None)
        .await;
    assert_eq!(malformed.status, StatusCode::UNAUTHORIZED);

    let uppercase = app
        .send(
            Method::GET,
            "/api/v1/bots/me",
            Some("wrbt_0123456789ABCDEF0123456789ABCDEF"),
            None,
        )
        .await;
    assert_eq!(uppercase.status, StatusCode::UNAUTHORIZED);

    assert!(app.audit.all().await.is_empty());
}

#[tokio::test]
async fn unknown_token_is_forbidden_and_audited_without_bot() {
    let app = TestApp::new();
    let token = crypto::generate_api_key();

    let res = app.send(Method::GET, "/api/v1/bots/me", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["reason"], "token_invalid");
    assert!(!res.body.to_string().contains(&token));

    let entries = app.audit.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].bot_id, None);
    assert_eq!(entries[0].status_code, 403);
    assert_eq!(entries[0].endpoint, "/api/v1/bots/me");
    assert_eq!(entries[0].method, "GET");
    assert_eq!(entries[0].user_agent.as_deref(), Some("wrbt-tests/1.0"));
}

#[tokio::test]
async fn revoked_token_is_audited_against_its_bot() {
    let app = TestApp::new();
    let (bot_id, token) = app.approved_bot("TestBot", None).await;
    app.revoke(&bot_id, None).await;

    let res = app.send(Method::GET, "/api/v1/bots/me", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["reason"], "revoked");

    let entries = app.audit.all().await;
    let last = entries.last().unwrap();
    assert_eq!(last.bot_id.map(|id| id.to_string()), Some(bot_id));
    assert_eq!(last.status_code, 403);
}

#[tokio::test]
async fn each_authenticated_request_writes_one_entry() {
    let app = TestApp::new();
    let (bot_id, token) = app.approved_bot("TestBot", None).await;

    for _ in 0..2 {
        let res = app.send(Method::GET, "/api/v1/bots/me", Some(&token), None).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    let history = app
        .send(Method::GET, "/api/v1/bots/me/requests?limit=10", Some(&token), None)
        .await;
    assert_eq!(history.status, StatusCode::OK);
    // The history request itself is audited after the handler runs.
    let requests = history.body["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r["bot_id"] == bot_id.as_str()));
    assert!(requests.iter().all(|r| r["status_code"] == 200));

    assert_eq!(app.audit.all().await.len(), 3);
}

#[tokio::test]
async fn read_only_bot_cannot_write() {
    let app = TestApp::new();
    let (_, token) = app.approved_bot("ReaderBot", None).await;

    let res = app
        .send(
            Method::PATCH,
            "/api/v1/bots/me",
            Some(&token),
            Some(json!({ "contact_email": "new@example.com" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.body["reason"], "insufficient_tier");

    // The denial is still attributed to the bot.
    let last = app.audit.all().await.pop().unwrap();
    assert!(last.bot_id.is_some());
    assert_eq!(last.status_code, 403);
}

#[tokio::test]
async fn write_limited_bot_can_update_profile() {
    let app = TestApp::new();
    let (_, token) = app.approved_bot("WriterBot", Some("WRITE_LIMITED")).await;

    let res = app
        .send(
            Method::PATCH,
            "/api/v1/bots/me",
            Some(&token),
            Some(json!({ "contact_email": "new@example.com" })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["contact_email"], "new@example.com");
    assert_eq!(res.body["tier"], "WRITE_LIMITED");

    let invalid = app
        .send(
            Method::PATCH,
            "/api/v1/bots/me",
            Some(&token),
            Some(json!({ "contact_email": "nope" })),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
}
