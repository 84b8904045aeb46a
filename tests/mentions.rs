//! Mention Notification Tests
//!
//! Covers recording mentions, listing, batch mark-sent, and the live stream.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::app;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

// ===========================================================================
// Recording and listing
// ===========================================================================

#[tokio::test]
async fn record_then_list_newest_first() {
    let app = app();
    let author = app.create_user("Avery");
    let recipient = app.create_user("Riley");

    for content in ["first @riley", "second @riley"] {
        let resp = app
            .post_json(
                "/mentions",
                json!({
                    "recipient_user_id": recipient.id,
                    "comment_id": Uuid::new_v4(),
                    "comment_content": content
                }),
                Some(&author.access_token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED);
        assert_eq!(resp.json()["mentioned_by"]["name"], "Avery");
    }

    let resp = app
        .get("/notifications/mentions", Some(&recipient.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let items = resp.json()["items"].as_array().unwrap().clone();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item["notification_sent"] == false));

    // the author sees nothing of the recipient's mentions
    let resp = app
        .get("/notifications/mentions", Some(&author.access_token))
        .await;
    assert!(resp.json()["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn long_comments_are_excerpted() {
    let app = app();
    let author = app.create_user("Avery");
    let recipient = app.create_user("Riley");

    let resp = app
        .post_json(
            "/mentions",
            json!({
                "recipient_user_id": recipient.id,
                "comment_id": Uuid::new_v4(),
                "comment_content": "a".repeat(250)
            }),
            Some(&author.access_token),
        )
        .await;
    let excerpt = resp.json()["comment_excerpt"].as_str().unwrap().to_string();
    assert_eq!(excerpt.chars().count(), 103);
    assert!(excerpt.ends_with("..."));
}

#[tokio::test]
async fn record_for_unknown_recipient_is_404() {
    let app = app();
    let author = app.create_user("Avery");

    let resp = app
        .post_json(
            "/mentions",
            json!({ "recipient_user_id": Uuid::new_v4(), "comment_id": Uuid::new_v4() }),
            Some(&author.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_requires_token() {
    let app = app();
    let resp = app.get("/notifications/mentions", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unavailable_store_is_503() {
    let app = app();
    let user = app.create_user("Riley");
    app.store.set_unavailable(true);

    let resp = app
        .get("/notifications/mentions", Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
}

// ===========================================================================
// Mark sent
// ===========================================================================

#[tokio::test]
async fn mark_sent_flips_only_named_rows_once() {
    let app = app();
    let author = app.create_user("Avery");
    let recipient = app.create_user("Riley");

    let mut ids = Vec::new();
    for _ in 0..3 {
        let resp = app
            .post_json(
                "/mentions",
                json!({ "recipient_user_id": recipient.id, "comment_id": Uuid::new_v4() }),
                Some(&author.access_token),
            )
            .await;
        ids.push(resp.json()["id"].as_str().unwrap().to_string());
    }

    let resp = app
        .post_json(
            "/notifications/mentions/mark-sent",
            json!({ "ids": [ids[0], ids[1]] }),
            Some(&recipient.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["updated"], 2);

    let resp = app
        .post_json(
            "/notifications/mentions/mark-sent",
            json!({ "ids": [ids[0], ids[1]] }),
            Some(&recipient.access_token),
        )
        .await;
    assert_eq!(resp.json()["updated"], 0);

    let items = app
        .get("/notifications/mentions", Some(&recipient.access_token))
        .await
        .json()["items"]
        .as_array()
        .unwrap()
        .clone();
    let unread: Vec<&str> = items
        .iter()
        .filter(|item| item["notification_sent"] == false)
        .map(|item| item["id"].as_str().unwrap())
        .collect();
    assert_eq!(unread, vec![ids[2].as_str()]);
}

#[tokio::test]
async fn mark_sent_with_empty_ids_touches_nothing() {
    let app = app();
    let user = app.create_user("Riley");
    app.store.set_unavailable(true);

    let resp = app
        .post_json(
            "/notifications/mentions/mark-sent",
            json!({ "ids": [] }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["updated"], 0);
}

// ===========================================================================
// Live stream
// ===========================================================================

#[tokio::test]
async fn stream_delivers_new_mentions_and_releases_on_disconnect() {
    let app = app();
    let author = app.create_user("Avery");
    let recipient = app.create_user("Riley");

    let request = Request::builder()
        .method(Method::GET)
        .uri("/notifications/mentions/stream")
        .header("Authorization", format!("Bearer {}", recipient.access_token))
        .body(Body::empty())
        .unwrap();
    let response = app.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.feed.subscriber_count(recipient.id), 1);

    let resp = app
        .post_json(
            "/mentions",
            json!({ "recipient_user_id": recipient.id, "comment_id": Uuid::new_v4() }),
            Some(&author.access_token),
        )
        .await;
    let mention_id = resp.json()["id"].as_str().unwrap().to_string();

    let mut body = response.into_body();
    let mut received = String::new();
    while !received.contains(&mention_id) {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("no event within timeout")
            .expect("stream ended")
            .expect("frame error");
        if let Ok(data) = frame.into_data() {
            received.push_str(&String::from_utf8_lossy(&data));
        }
    }
    assert!(received.contains("event: mention"));

    drop(body);
    assert_eq!(app.feed.subscriber_count(recipient.id), 0);
}

#[tokio::test]
async fn stream_requires_token() {
    let app = app();
    let resp = app.get("/notifications/mentions/stream", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}
