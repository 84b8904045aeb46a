use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BriefGenerated,
    ArticleGenerated,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::BriefGenerated => "brief_generated",
            NotificationType::ArticleGenerated => "article_generated",
        }
    }

    pub fn title(&self, brief_title: &str) -> String {
        match self {
            NotificationType::BriefGenerated => format!("Content Brief Generated: {}", brief_title),
            NotificationType::ArticleGenerated => format!("Article Generated: {}", brief_title),
        }
    }

    pub fn message(&self, brief_title: &str, product_name: Option<&str>) -> String {
        let product = product_name
            .filter(|name| !name.trim().is_empty())
            .map(|name| format!(" for {}", name))
            .unwrap_or_default();
        match self {
            NotificationType::BriefGenerated => format!(
                "Your content brief \"{}\"{} has been generated and is ready for your approval.",
                brief_title, product
            ),
            NotificationType::ArticleGenerated => format!(
                "Your article \"{}\"{} has been generated and is ready for review.",
                brief_title, product
            ),
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownNotificationType(pub String);

impl FromStr for NotificationType {
    type Err = UnknownNotificationType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "brief_generated" => Ok(NotificationType::BriefGenerated),
            "article_generated" => Ok(NotificationType::ArticleGenerated),
            other => Err(UnknownNotificationType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub brief_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUserNotification {
    pub user_id: Uuid,
    pub brief_id: Option<Uuid>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types_only() {
        assert_eq!(
            "article_generated".parse::<NotificationType>(),
            Ok(NotificationType::ArticleGenerated)
        );
        assert!("brief_approved".parse::<NotificationType>().is_err());
    }

    #[test]
    fn message_mentions_product_when_present() {
        let kind = NotificationType::BriefGenerated;
        assert_eq!(kind.title("Launch Plan"), "Content Brief Generated: Launch Plan");
        assert_eq!(
            kind.message("Launch Plan", Some("Acme CRM")),
            "Your content brief \"Launch Plan\" for Acme CRM has been generated and is ready for your approval."
        );
        assert!(!NotificationType::ArticleGenerated
            .message("Launch Plan", None)
            .contains(" for "));
    }
}
