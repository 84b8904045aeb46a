use std::convert::Infallible;

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::dispatch::{DispatchError, DispatchPayload, DispatchService};
use crate::app::insights::{InsightsReport, ProductInsightsService};
use crate::app::mentions::{MentionService, RecordMentionError};
use crate::app::user_notifications::UserNotificationService;
use crate::domain::mention::MentionNotification;
use crate::domain::ports::StoreError;
use crate::domain::user_notification::UserNotification;
use crate::http::{AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

/// Unreachable stores answer 503 so clients know to retry.
fn store_failure(err: &StoreError, message: &'static str) -> AppError {
    match err {
        StoreError::Unavailable { .. } => AppError::unavailable(message),
        StoreError::Rejected { .. } => AppError::internal(message),
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = match &state.db {
        Some(db) => db.ping().await.is_ok(),
        None => true,
    };
    let relay = state
        .relay
        .as_ref()
        .map_or(true, |relay| relay.is_connected());
    let status = if db && relay { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

// ---- mentions ----

pub async fn list_mentions(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ListResponse<MentionNotification>>, AppError> {
    let service = MentionService::new(state.mentions.clone(), state.profiles.clone());
    let items = service.list(auth.user_id).await.map_err(|err| {
        tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list mentions");
        store_failure(&err, "failed to list mentions")
    })?;

    Ok(Json(ListResponse {
        items,
        next_cursor: None,
    }))
}

#[derive(Deserialize)]
pub struct MarkSentRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct MarkSentResponse {
    pub updated: u64,
}

pub async fn mark_mentions_sent(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<MarkSentRequest>,
) -> Result<Json<MarkSentResponse>, AppError> {
    let service = MentionService::new(state.mentions.clone(), state.profiles.clone());
    let updated = service
        .mark_sent(auth.user_id, &payload.ids)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, count = payload.ids.len(), "failed to mark mentions sent");
            store_failure(&err, "failed to mark mentions sent")
        })?;

    Ok(Json(MarkSentResponse { updated }))
}

/// Events buffered per stream before a stalled client starts losing them.
const STREAM_BUFFER: usize = 64;

/// Server-sent `mention` events for the caller. The feed subscription lives
/// inside the stream, so a client disconnect releases it.
pub async fn stream_mentions(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (subscription, rx) = state.feed.subscribe_bounded(auth.user_id, STREAM_BUFFER);
    tracing::debug!(user_id = %auth.user_id, "mention stream opened");

    let events = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        let notification = rx.recv().await?;
        let event = match Event::default().event("mention").json_data(&notification) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, mention_id = %notification.id, "failed to encode mention event");
                Event::default().event("mention").data(notification.id.to_string())
            }
        };
        Some((Ok(event), (rx, subscription)))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
pub struct RecordMentionRequest {
    pub recipient_user_id: Uuid,
    pub comment_id: Uuid,
    pub comment_content: Option<String>,
}

pub async fn record_mention(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RecordMentionRequest>,
) -> Result<(StatusCode, Json<MentionNotification>), AppError> {
    let service = MentionService::new(state.mentions.clone(), state.profiles.clone());
    let created = service
        .record(
            auth.user_id,
            payload.recipient_user_id,
            payload.comment_id,
            payload.comment_content.as_deref(),
        )
        .await
        .map_err(|err| match err {
            RecordMentionError::RecipientNotFound => AppError::not_found("recipient not found"),
            RecordMentionError::Store(err) => {
                tracing::error!(error = ?err, user_id = %auth.user_id, "failed to record mention");
                store_failure(&err, "failed to record mention")
            }
        })?;

    Ok((StatusCode::CREATED, Json(created)))
}

// ---- user notifications ----

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<UserNotification>>, AppError> {
    let limit = query.limit.unwrap_or(30);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    let cursor = parse_cursor(query.cursor)?;

    let service = UserNotificationService::new(state.user_notifications.clone());
    let mut notifications = service
        .list(auth.user_id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list notifications");
            store_failure(&err, "failed to list notifications")
        })?;

    let next_cursor = if notifications.len() > limit as usize {
        notifications.truncate(limit as usize);
        notifications.last().map(|last| (last.created_at, last.id))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: notifications,
        next_cursor: encode_cursor(next_cursor),
    }))
}

pub async fn mark_notification_read(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let service = UserNotificationService::new(state.user_notifications.clone());
    let updated = service
        .mark_read(id, auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, notification_id = %id, user_id = %auth.user_id, "failed to mark notification read");
            store_failure(&err, "failed to mark notification read")
        })?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("notification not found"))
    }
}

// ---- dispatch ----

/// Every body this route cannot decode is a 400, whatever axum's rejection
/// status. Only an over-limit body keeps its 413.
fn dispatch_rejection(rejection: JsonRejection) -> AppError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::from(rejection);
    }
    AppError::bad_request(rejection.body_text())
}

/// Validation runs before authentication, so a malformed body is a 400 even
/// without credentials.
pub async fn send_user_notification(
    State(state): State<AppState>,
    auth: Result<AuthUser, AppError>,
    payload: Result<Json<DispatchPayload>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(payload) = payload.map_err(dispatch_rejection)?;
    let request = payload
        .validate()
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    let caller = auth?;

    let service = DispatchService::new(
        state.user_notifications.clone(),
        state.profiles.clone(),
        state.chat.clone(),
        state.email.clone(),
    );
    let user_id = request.user_id;
    let outcome = service.dispatch(request).await.map_err(|err| match err {
        DispatchError::Validation(message) => AppError::bad_request(message),
        DispatchError::NotFound => AppError::not_found("User profile not found"),
        DispatchError::Store(err) => {
            tracing::error!(error = ?err, %user_id, caller = %caller.user_id, "failed to create user notification");
            AppError::internal("Failed to create notification")
        }
    })?;

    tracing::info!(
        notification_id = %outcome.notification_id,
        %user_id,
        slack = outcome.channels.chat,
        email = outcome.channels.email,
        "user notification dispatched"
    );

    Ok(Json(json!({
        "success": true,
        "message": "User notification sent successfully",
        "notification_id": outcome.notification_id,
        "channels": outcome.channels,
    })))
}

pub async fn preflight() -> &'static str {
    "ok"
}

// ---- insights ----

#[derive(Deserialize)]
pub struct InsightsQuery {
    pub source_product_id: Option<Uuid>,
    pub research_result_id: Option<Uuid>,
}

pub async fn product_insights(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<InsightsQuery>,
) -> Result<Json<InsightsReport>, AppError> {
    if query.source_product_id.is_none() && query.research_result_id.is_none() {
        return Err(AppError::bad_request(
            "source_product_id or research_result_id is required",
        ));
    }

    let service = ProductInsightsService::new(state.products.clone());
    let report = service
        .load(query.source_product_id, query.research_result_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to load product insights");
            store_failure(&err, "failed to load product insights")
        })?;

    Ok(Json(report))
}
