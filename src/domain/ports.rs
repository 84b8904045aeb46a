//! Edges of the notification pipeline.
//!
//! Stores and outbound sinks are reached through these traits so the
//! services never see sqlx or reqwest types. Each port returns a typed error
//! that callers map onto HTTP statuses or per-channel delivery flags.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::mention::{MentionNotification, NewMention};
use crate::domain::profile::{ChatTarget, UserProfile};
use crate::domain::user_notification::{NewUserNotification, NotificationType, UserNotification};

/// Failures of the notification store. Both variants are retryable by the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("notification store unavailable: {message}")]
    Unavailable { message: String },
    /// The store was reached but rejected the statement.
    #[error("notification store rejected the request: {message}")]
    Rejected { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Tls(_) => StoreError::unavailable(err.to_string()),
            other => StoreError::rejected(other.to_string()),
        }
    }
}

/// Failures of the chat and email sinks. Never escalated past dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink is not configured")]
    NotConfigured,
    /// Credentials were revoked or are invalid.
    #[error("sink credentials revoked: {reason}")]
    Revoked { reason: String },
    #[error("sink rejected the message: {reason}")]
    Rejected { reason: String },
    #[error("sink transport failed: {message}")]
    Transport { message: String },
}

#[async_trait]
pub trait MentionStore: Send + Sync {
    /// All notifications for the recipient, newest first.
    async fn list_for_recipient(
        &self,
        recipient: Uuid,
    ) -> Result<Vec<MentionNotification>, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<MentionNotification>, StoreError>;

    /// Every recipient's notifications created at or after `since`, oldest
    /// first. Used to replay rows whose change event was missed.
    async fn list_since(
        &self,
        since: OffsetDateTime,
    ) -> Result<Vec<MentionNotification>, StoreError>;

    async fn insert(&self, mention: NewMention) -> Result<MentionNotification, StoreError>;

    /// Sets `notification_sent` for the given ids owned by `recipient`.
    /// Returns how many rows flipped; already-sent rows do not count.
    async fn mark_sent(&self, recipient: Uuid, ids: &[Uuid]) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait UserNotificationStore: Send + Sync {
    async fn insert(&self, notification: NewUserNotification)
        -> Result<UserNotification, StoreError>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UserNotification>, StoreError>;

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError>;

    /// Drops the stored chat credentials and opts the user out of chat.
    async fn clear_chat_integration(&self, user_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Raw `product_data` payloads. `source_product_id` is tried first; when it
    /// yields nothing the research id matches either the product id or its
    /// research result id.
    async fn product_payloads(
        &self,
        source_product_id: Option<Uuid>,
        research_result_id: Option<Uuid>,
    ) -> Result<Vec<Value>, StoreError>;
}

/// One chat message for a recipient.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub target: ChatTarget,
    pub text: String,
    pub blocks: Value,
}

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn post(&self, message: &ChatMessage) -> Result<(), SinkError>;
}

/// Request handed to the email-delivery function.
#[derive(Debug, Clone)]
pub struct EmailRequest {
    pub user_id: Uuid,
    pub brief_id: Option<Uuid>,
    pub brief_title: String,
    pub notification_type: NotificationType,
}

#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> Result<(), SinkError>;
}
