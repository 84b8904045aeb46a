use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ports::{ChatMessage, ChatSink, SinkError};

/// Posts messages through the Slack Web API (`chat.postMessage`) using the
/// recipient's own bot token.
#[derive(Clone)]
pub struct SlackChatSink {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    blocks: &'a Value,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    error: Option<String>,
}

impl SlackChatSink {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }
}

/// Slack error codes meaning the stored token can no longer be used.
fn is_revocation(code: &str) -> bool {
    matches!(code, "invalid_auth" | "token_revoked")
}

#[async_trait]
impl ChatSink for SlackChatSink {
    async fn post(&self, message: &ChatMessage) -> Result<(), SinkError> {
        let url = format!("{}/chat.postMessage", self.api_base);
        let body = PostMessage {
            channel: &message.target.channel_id,
            text: &message.text,
            blocks: &message.blocks,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&message.target.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| SinkError::Transport {
                message: err.to_string(),
            })?;

        let status = response.status();
        let result: SlackResponse = response.json().await.map_err(|err| SinkError::Transport {
            message: format!("unreadable slack response (status {}): {}", status, err),
        })?;

        if result.ok {
            tracing::debug!(channel = %message.target.channel_id, "slack message posted");
            return Ok(());
        }

        let code = result.error.unwrap_or_else(|| format!("http_{}", status.as_u16()));
        if is_revocation(&code) {
            Err(SinkError::Revoked { reason: code })
        } else {
            Err(SinkError::Rejected { reason: code })
        }
    }
}
