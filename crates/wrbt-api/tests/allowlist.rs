//! Allowlisted platform identities skip manual approval.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;

fn platform_registration() -> serde_json::Value {
    json!({
        "name": "DiscordHelper",
        "platform": "Discord",
        "platform_user_id": "1234567890",
        "platform_username": "helper#0001",
    })
}

#[tokio::test]
async fn allowlisted_registration_returns_token_once() {
    let app = TestApp::new();

    let entry = app
        .admin(
            Method::POST,
            "/api/v1/admin/allowlist",
            Some(json!({
                "platform": "discord",
                "platform_user_id": "1234567890",
                "tier": "WRITE_LIMITED",
                "reason": "first-party integration",
            })),
        )
        .await;
    assert_eq!(entry.status, StatusCode::CREATED);
    assert_eq!(entry.body["added_by"], "alice");

    let reg = app.register(platform_registration()).await;
    assert_eq!(reg.status, StatusCode::CREATED);
    assert_eq!(reg.body["tier"], "WRITE_LIMITED");
    let token = reg.body["token"].as_str().unwrap().to_string();
    let code = reg.body["pairing_code"].as_str().unwrap().to_string();

    let me = app.send(Method::GET, "/api/v1/bots/me", Some(&token), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["tier"], "WRITE_LIMITED");
    let entry_id = entry.body["id"].as_str().unwrap();
    let approved_by = me.body["approved_by"].as_str().unwrap();
    assert_eq!(approved_by, format!("allowlist:{entry_id}"));

    let bot_id = me.body["id"].as_str().unwrap();
    let detail = app
        .admin(Method::GET, &format!("/api/v1/admin/bots/{bot_id}"), None)
        .await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["approved_via_allowlist"], entry_id);

    let status = app.status(&code).await;
    assert_eq!(status.body["status"], "approved");
    assert!(status.body.get("token").is_none());
}

#[tokio::test]
async fn unlisted_platform_identity_stays_pending() {
    let app = TestApp::new();
    let reg = app.register(platform_registration()).await;
    assert_eq!(reg.status, StatusCode::CREATED);
    assert!(reg.body.get("token").is_none());

    let code = reg.body["pairing_code"].as_str().unwrap();
    assert_eq!(app.status(code).await.body["status"], "pending");
}

#[tokio::test]
async fn duplicate_and_revoked_entries() {
    let app = TestApp::new();
    let body = json!({ "platform": "discord", "platform_user_id": "1234567890" });

    let entry = app
        .admin(Method::POST, "/api/v1/admin/allowlist", Some(body.clone()))
        .await;
    assert_eq!(entry.status, StatusCode::CREATED);
    assert_eq!(entry.body["tier"], "READ_ONLY");
    let entry_id = entry.body["id"].as_str().unwrap().to_string();

    let dup = app
        .admin(Method::POST, "/api/v1/admin/allowlist", Some(body.clone()))
        .await;
    assert_eq!(dup.status, StatusCode::CONFLICT);
    assert_eq!(dup.body["error"], "ALREADY_EXISTS");

    let revoke_uri = format!("/api/v1/admin/allowlist/{entry_id}/revoke");
    let revoked = app
        .admin(Method::POST, &revoke_uri, Some(json!({ "reason": "integration retired" })))
        .await;
    assert_eq!(revoked.status, StatusCode::OK);
    assert!(revoked.body["revoked_at"].is_string());

    let again = app.admin(Method::POST, &revoke_uri, None).await;
    assert_eq!(again.status, StatusCode::CONFLICT);

    let reg = app.register(platform_registration()).await;
    assert!(reg.body.get("token").is_none());

    let active = app.admin(Method::GET, "/api/v1/admin/allowlist", None).await;
    assert_eq!(active.body["total"], 0);
    let all = app
        .admin(Method::GET, "/api/v1/admin/allowlist?include_inactive=true", None)
        .await;
    assert_eq!(all.body["total"], 1);

    // A revoked entry no longer blocks a fresh one.
    let fresh = app.admin(Method::POST, "/api/v1/admin/allowlist", Some(body)).await;
    assert_eq!(fresh.status, StatusCode::CREATED);
}

#[tokio::test]
async fn allowlist_requires_admin() {
    let app = TestApp::new();
    let res = app.send(Method::GET, "/api/v1/admin/allowlist", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let missing = app
        .admin(Method::POST, "/api/v1/admin/allowlist/not-a-uuid/revoke", None)
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
}
