//! Dispatch Function Tests
//!
//! Covers validation order, authentication, profile lookup, and best-effort
//! chat/email fan-out including revoked chat credentials.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::{app, RecordingChat, RecordingEmail, TestApp, TEST_BODY_LIMIT};
use serde_json::{json, Value};
use uuid::Uuid;

use bofu_notify::domain::ports::SinkError;

const DISPATCH: &str = "/functions/send-user-notification";

fn body_for(user_id: Uuid) -> Value {
    json!({
        "userId": user_id,
        "briefTitle": "Q3 Launch Plan",
        "productName": "Acme CRM",
        "notificationType": "brief_generated"
    })
}

// ===========================================================================
// Preflight and CORS
// ===========================================================================

#[tokio::test]
async fn options_returns_ok_with_cors_headers() {
    let app = app();
    let resp = app.request(Method::OPTIONS, DISPATCH, None, &[]).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "ok");
    assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
    assert!(resp
        .header("access-control-allow-headers")
        .unwrap()
        .contains("authorization"));
}

#[tokio::test]
async fn other_methods_are_rejected() {
    let app = app();
    let resp = app.get(DISPATCH, None).await;
    assert_eq!(resp.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
}

// ===========================================================================
// Validation runs before authentication
// ===========================================================================

#[tokio::test]
async fn missing_fields_are_400_even_without_credentials() {
    let app = app();
    let resp = app
        .post_json(DISPATCH, json!({ "briefTitle": "Plan" }), None)
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "missing required fields: userId, notificationType"
    );
    assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
}

#[tokio::test]
async fn unknown_type_is_400() {
    let app = app();
    let user = app.create_user("Riley");
    let mut body = body_for(user.id);
    body["notificationType"] = json!("brief_approved");

    let resp = app.post_json(DISPATCH, body, Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid notification type");
    assert!(app.store.user_notifications_for(user.id).is_empty());
}

#[tokio::test]
async fn malformed_json_is_400() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri(DISPATCH)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let resp = app.send(request).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_typed_fields_are_400() {
    let app = app();
    let user = app.create_user("Riley");

    let mut body = body_for(user.id);
    body["notificationType"] = json!(5);
    let resp = app.post_json(DISPATCH, body, Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.header("access-control-allow-origin"), Some("*"));

    let mut body = body_for(user.id);
    body["userId"] = json!(123);
    let resp = app.post_json(DISPATCH, body, Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    assert!(app.store.user_notifications_for(user.id).is_empty());
}

#[tokio::test]
async fn body_without_json_content_type_is_400() {
    let app = app();
    let user = app.create_user("Riley");
    let request = Request::builder()
        .method(Method::POST)
        .uri(DISPATCH)
        .header("Authorization", format!("Bearer {}", user.access_token))
        .body(Body::from(body_for(user.id).to_string()))
        .unwrap();

    let resp = app.send(request).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(app.store.user_notifications_for(user.id).is_empty());
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = app();
    let user = app.create_user("Riley");
    let mut body = body_for(user.id);
    body["briefTitle"] = json!("x".repeat(TEST_BODY_LIMIT * 2));

    let resp = app.post_json(DISPATCH, body, Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.store.user_notifications_for(user.id).is_empty());
}

#[tokio::test]
async fn valid_body_without_credentials_is_401() {
    let app = app();
    let user = app.create_user("Riley");

    let resp = app.post_json(DISPATCH, body_for(user.id), None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app
        .post_json(DISPATCH, body_for(user.id), Some("not-a-token"))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert!(app.store.user_notifications_for(user.id).is_empty());
}

// ===========================================================================
// Delivery
// ===========================================================================

#[tokio::test]
async fn unknown_profile_is_404() {
    let app = app();
    let caller = app.create_user("Caller");

    let resp = app
        .post_json(DISPATCH, body_for(Uuid::new_v4()), Some(&caller.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "User profile not found");
}

#[tokio::test]
async fn in_app_row_is_written_with_templated_copy() {
    let app = app();
    let user = app.create_user("Riley");

    let resp = app
        .post_json(DISPATCH, body_for(user.id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let body = resp.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "User notification sent successfully");
    assert_eq!(
        body["channels"],
        json!({ "in_app": true, "slack": false, "email": true })
    );

    let rows = app.store.user_notifications_for(user.id);
    assert_eq!(rows.len(), 1);
    assert_eq!(body["notification_id"], json!(rows[0].id));
    assert_eq!(rows[0].title, "Content Brief Generated: Q3 Launch Plan");
    assert_eq!(
        rows[0].message,
        "Your content brief \"Q3 Launch Plan\" for Acme CRM has been generated and is ready for your approval."
    );
    assert!(!rows[0].is_read);

    // no chat target configured
    assert_eq!(app.chat.post_count(), 0);
    assert_eq!(app.email.sent_count(), 1);
}

#[tokio::test]
async fn chat_is_posted_when_integration_enabled() {
    let app = app();
    let user = app.create_chat_user("Riley");

    let resp = app
        .post_json(DISPATCH, body_for(user.id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["channels"]["slack"], true);

    let posts = app.chat.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].target.channel_id, "C1");
    assert_eq!(posts[0].text, "Content Brief Generated: Q3 Launch Plan");
}

#[tokio::test]
async fn revoked_chat_token_clears_integration_but_succeeds() {
    let app = TestApp::with_sinks(
        RecordingChat::answering(Err(SinkError::Revoked {
            reason: "token_revoked".into(),
        })),
        RecordingEmail::answering(Ok(())),
    );
    let user = app.create_chat_user("Riley");

    let resp = app
        .post_json(DISPATCH, body_for(user.id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.json()["channels"],
        json!({ "in_app": true, "slack": false, "email": true })
    );

    let profile = app.store.profile(user.id).unwrap();
    assert!(!profile.slack_notifications_enabled);
    assert!(profile.slack_access_token.is_none());
    assert!(profile.slack_channel_id.is_none());
    assert!(profile.slack_team_id.is_none());

    // a second dispatch no longer attempts chat
    app.post_json(DISPATCH, body_for(user.id), Some(&user.access_token))
        .await;
    assert_eq!(app.chat.post_count(), 1);
}

#[tokio::test]
async fn other_chat_failures_keep_integration() {
    let app = TestApp::with_sinks(
        RecordingChat::answering(Err(SinkError::Rejected {
            reason: "channel_not_found".into(),
        })),
        RecordingEmail::answering(Ok(())),
    );
    let user = app.create_chat_user("Riley");

    let resp = app
        .post_json(DISPATCH, body_for(user.id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["channels"]["slack"], false);
    assert!(app.store.profile(user.id).unwrap().slack_notifications_enabled);
}

#[tokio::test]
async fn sink_failures_never_fail_dispatch() {
    let app = TestApp::with_sinks(
        RecordingChat::answering(Err(SinkError::Transport {
            message: "timed out".into(),
        })),
        RecordingEmail::answering(Err(SinkError::Rejected {
            reason: "status=502".into(),
        })),
    );
    let user = app.create_chat_user("Riley");

    let resp = app
        .post_json(DISPATCH, body_for(user.id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(
        resp.json()["channels"],
        json!({ "in_app": true, "slack": false, "email": false })
    );
    assert_eq!(app.store.user_notifications_for(user.id).len(), 1);
}

#[tokio::test]
async fn store_failure_is_500_and_skips_sinks() {
    let app = app();
    let user = app.create_chat_user("Riley");
    app.store.set_unavailable(true);

    let resp = app
        .post_json(DISPATCH, body_for(user.id), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.chat.post_count(), 0);
    assert_eq!(app.email.sent_count(), 0);
}

#[tokio::test]
async fn email_request_carries_brief_fields() {
    let app = app();
    let user = app.create_user("Riley");
    let brief_id = Uuid::new_v4();
    let mut body = body_for(user.id);
    body["briefId"] = json!(brief_id);
    body["notificationType"] = json!("article_generated");

    let resp = app.post_json(DISPATCH, body, Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::OK);

    let sent = app.email.sent.lock().unwrap();
    assert_eq!(sent[0].brief_id, Some(brief_id));
    assert_eq!(sent[0].brief_title, "Q3 Launch Plan");
    assert_eq!(sent[0].user_id, user.id);
    assert_eq!(
        app.store.user_notifications_for(user.id)[0].title,
        "Article Generated: Q3 Launch Plan"
    );
}
