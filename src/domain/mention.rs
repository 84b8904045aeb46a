use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Snapshot of the comment author, captured when the mention was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionAuthor {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl MentionAuthor {
    /// Name shown to the recipient: display name, else the local part of the
    /// email, else "Someone".
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if let Some(local) = self
            .email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
        {
            return local.to_string();
        }
        "Someone".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionNotification {
    pub id: Uuid,
    pub recipient_user_id: Uuid,
    pub comment_id: Uuid,
    pub mentioned_by: MentionAuthor,
    pub comment_excerpt: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub notification_sent: bool,
}

#[derive(Debug, Clone)]
pub struct NewMention {
    pub recipient_user_id: Uuid,
    pub comment_id: Uuid,
    pub mentioned_by: MentionAuthor,
    pub comment_excerpt: Option<String>,
}

const EXCERPT_CHARS: usize = 100;

/// Trims comment content down to the excerpt kept on the notification row.
pub fn excerpt(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        Some(format!("{}...", head))
    } else {
        Some(head)
    }
}

/// Newest first, ties broken by id so the order is total.
pub fn sort_newest_first(items: &mut [MentionNotification]) {
    items.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
