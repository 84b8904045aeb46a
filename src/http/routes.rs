use axum::http::{header, HeaderValue};
use axum::{routing::get, routing::post, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn mentions() -> Router<AppState> {
    Router::new()
        .route("/notifications/mentions", get(handlers::list_mentions))
        .route(
            "/notifications/mentions/mark-sent",
            post(handlers::mark_mentions_sent),
        )
        .route(
            "/notifications/mentions/stream",
            get(handlers::stream_mentions),
        )
        .route("/mentions", post(handlers::record_mention))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
}

/// Browser-callable function endpoint: permissive CORS on every response,
/// including errors and the 405 for unsupported methods.
pub fn functions(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/functions/send-user-notification",
            post(handlers::send_user_notification).options(handlers::preflight),
        )
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("authorization, x-client-info, apikey, content-type"),
        ))
}

pub fn products() -> Router<AppState> {
    Router::new().route("/products/insights", get(handlers::product_insights))
}
