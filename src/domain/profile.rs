use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient profile with contact preferences and the chat integration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub company_name: Option<String>,
    #[serde(skip_serializing)]
    pub slack_access_token: Option<String>,
    pub slack_team_id: Option<String>,
    pub slack_team_name: Option<String>,
    pub slack_user_id: Option<String>,
    pub slack_channel_id: Option<String>,
    pub slack_channel_name: Option<String>,
    pub slack_notifications_enabled: bool,
}

/// Where a chat message should go for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTarget {
    pub access_token: String,
    pub channel_id: String,
    pub channel_name: Option<String>,
}

impl UserProfile {
    /// Present only when the recipient opted in and holds usable credentials.
    pub fn chat_target(&self) -> Option<ChatTarget> {
        if !self.slack_notifications_enabled {
            return None;
        }
        let access_token = self.slack_access_token.clone().filter(|t| !t.is_empty())?;
        let channel_id = self.slack_channel_id.clone().filter(|c| !c.is_empty())?;
        Some(ChatTarget {
            access_token,
            channel_id,
            channel_name: self.slack_channel_name.clone(),
        })
    }

    pub fn clear_chat_integration(&mut self) {
        self.slack_access_token = None;
        self.slack_team_id = None;
        self.slack_team_name = None;
        self.slack_user_id = None;
        self.slack_channel_id = None;
        self.slack_channel_name = None;
        self.slack_notifications_enabled = false;
    }
}
