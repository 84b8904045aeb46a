//! Fan-out of one user notification: the in-app row is the only required
//! delivery, chat and email are attempted after it and reported per channel.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    ChatMessage, ChatSink, EmailRequest, EmailSink, ProfileStore, SinkError, StoreError,
    UserNotificationStore,
};
use crate::domain::profile::UserProfile;
use crate::domain::user_notification::{NewUserNotification, NotificationType};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),
    #[error("User profile not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body as received. Every field is optional here so that one response can
/// name all missing fields at once.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    pub user_id: Option<String>,
    pub brief_id: Option<String>,
    pub brief_title: Option<String>,
    pub product_name: Option<String>,
    pub notification_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub user_id: Uuid,
    pub brief_id: Option<Uuid>,
    pub brief_title: String,
    pub product_name: Option<String>,
    pub notification_type: NotificationType,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl DispatchPayload {
    pub fn validate(&self) -> Result<DispatchRequest, DispatchError> {
        let user_id = present(&self.user_id);
        let brief_title = present(&self.brief_title);
        let notification_type = present(&self.notification_type);

        let missing: Vec<&str> = [
            ("userId", user_id.is_none()),
            ("briefTitle", brief_title.is_none()),
            ("notificationType", notification_type.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(DispatchError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let notification_type: NotificationType = notification_type
            .unwrap_or_default()
            .parse()
            .map_err(|_| DispatchError::Validation("invalid notification type".into()))?;
        let user_id = Uuid::parse_str(user_id.unwrap_or_default())
            .map_err(|_| DispatchError::Validation("invalid userId".into()))?;
        let brief_id = present(&self.brief_id)
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| DispatchError::Validation("invalid briefId".into()))?;

        Ok(DispatchRequest {
            user_id,
            brief_id,
            brief_title: brief_title.unwrap_or_default().to_string(),
            product_name: present(&self.product_name).map(str::to_string),
            notification_type,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub in_app: bool,
    #[serde(rename = "slack")]
    pub chat: bool,
    pub email: bool,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub notification_id: Uuid,
    pub channels: ChannelStatus,
}

pub struct DispatchService {
    notifications: Arc<dyn UserNotificationStore>,
    profiles: Arc<dyn ProfileStore>,
    chat: Arc<dyn ChatSink>,
    email: Arc<dyn EmailSink>,
}

impl DispatchService {
    pub fn new(
        notifications: Arc<dyn UserNotificationStore>,
        profiles: Arc<dyn ProfileStore>,
        chat: Arc<dyn ChatSink>,
        email: Arc<dyn EmailSink>,
    ) -> Self {
        Self {
            notifications,
            profiles,
            chat,
            email,
        }
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let profile = self
            .profiles
            .find(request.user_id)
            .await?
            .ok_or(DispatchError::NotFound)?;

        let kind = request.notification_type;
        let title = kind.title(&request.brief_title);
        let message = kind.message(&request.brief_title, request.product_name.as_deref());

        let created = self
            .notifications
            .insert(NewUserNotification {
                user_id: request.user_id,
                brief_id: request.brief_id,
                notification_type: kind,
                title: title.clone(),
                message,
            })
            .await?;
        info!(notification_id = %created.id, user_id = %request.user_id, kind = %kind, "user notification created");

        let chat = self.send_chat(&profile, &request, title).await;
        let email = self.send_email(&request).await;

        Ok(DispatchOutcome {
            notification_id: created.id,
            channels: ChannelStatus {
                in_app: true,
                chat,
                email,
            },
        })
    }

    async fn send_chat(&self, profile: &UserProfile, request: &DispatchRequest, title: String) -> bool {
        let Some(target) = profile.chat_target() else {
            debug!(user_id = %profile.id, "chat notifications disabled or not configured");
            return false;
        };

        let message = ChatMessage {
            target,
            text: title,
            blocks: chat_blocks(request, OffsetDateTime::now_utc()),
        };
        match self.chat.post(&message).await {
            Ok(()) => {
                info!(user_id = %profile.id, channel = ?message.target.channel_name, "chat notification sent");
                true
            }
            Err(SinkError::Revoked { reason }) => {
                warn!(user_id = %profile.id, %reason, "chat credentials revoked, clearing integration");
                if let Err(err) = self.profiles.clear_chat_integration(profile.id).await {
                    warn!(error = ?err, user_id = %profile.id, "failed to clear chat integration");
                }
                false
            }
            Err(err) => {
                warn!(error = ?err, user_id = %profile.id, "chat notification failed");
                false
            }
        }
    }

    async fn send_email(&self, request: &DispatchRequest) -> bool {
        let email = EmailRequest {
            user_id: request.user_id,
            brief_id: request.brief_id,
            brief_title: request.brief_title.clone(),
            notification_type: request.notification_type,
        };
        match self.email.send(&email).await {
            Ok(()) => true,
            Err(SinkError::NotConfigured) => {
                debug!(user_id = %request.user_id, "email delivery not configured");
                false
            }
            Err(err) => {
                warn!(error = ?err, user_id = %request.user_id, "email notification failed");
                false
            }
        }
    }
}

/// Block-kit body: a type-specific header and summary, then the shared
/// next-steps footer stamped with `now`.
pub fn chat_blocks(request: &DispatchRequest, now: OffsetDateTime) -> Value {
    let title = &request.brief_title;
    let (header, summary, field_label) = match request.notification_type {
        NotificationType::BriefGenerated => (
            "📝 Content Brief Generated",
            format!("Your content brief *\"{}\"* has been generated and is ready for your approval!", title),
            "Brief Title",
        ),
        NotificationType::ArticleGenerated => (
            "🚀 Article Generated",
            format!("Great news! Your article *\"{}\"* has been generated and is ready for review.", title),
            "Article Title",
        ),
    };

    let mut fields = vec![json!({ "type": "mrkdwn", "text": format!("*{}:*\n{}", field_label, title) })];
    if let Some(product) = &request.product_name {
        fields.push(json!({ "type": "mrkdwn", "text": format!("*Product:*\n{}", product) }));
    }

    let stamp = now
        .format(format_description!(
            "[weekday], [month repr:long] [day padding:none], [year] [hour]:[minute] UTC"
        ))
        .unwrap_or_else(|_| now.to_string());

    json!([
        { "type": "header", "text": { "type": "plain_text", "text": header, "emoji": true } },
        { "type": "section", "text": { "type": "mrkdwn", "text": summary } },
        { "type": "section", "fields": fields },
        {
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": "*Next Steps:*\n• Log into your BOFU dashboard to review\n• Check your email for detailed information\n• Questions? Contact our support team"
            }
        },
        { "type": "divider" },
        {
            "type": "context",
            "elements": [
                { "type": "mrkdwn", "text": format!("📅 {} | 🤖 BOFU AI Notification System", stamp) }
            ]
        }
    ])
}
