use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::app::center::MentionApi;
use crate::domain::mention::{excerpt, MentionAuthor, MentionNotification, NewMention};
use crate::domain::ports::{MentionStore, ProfileStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RecordMentionError {
    #[error("recipient not found")]
    RecipientNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fetch and read-state mutation of mention notifications.
#[derive(Clone)]
pub struct MentionService {
    mentions: Arc<dyn MentionStore>,
    profiles: Arc<dyn ProfileStore>,
}

impl MentionService {
    pub fn new(mentions: Arc<dyn MentionStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { mentions, profiles }
    }

    pub async fn list(&self, recipient: Uuid) -> Result<Vec<MentionNotification>, StoreError> {
        self.mentions.list_for_recipient(recipient).await
    }

    /// Marks exactly `ids` as sent for `recipient`. Empty input never reaches
    /// the store; repeating a call is harmless.
    pub async fn mark_sent(&self, recipient: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut unique = ids.to_vec();
        unique.sort_unstable();
        unique.dedup();
        self.mentions.mark_sent(recipient, &unique).await
    }

    /// Writes a mention row for `recipient`, snapshotting the author's
    /// profile. The insert is what feeds live subscribers.
    pub async fn record(
        &self,
        author_id: Uuid,
        recipient: Uuid,
        comment_id: Uuid,
        comment_content: Option<&str>,
    ) -> Result<MentionNotification, RecordMentionError> {
        if self.profiles.find(recipient).await?.is_none() {
            return Err(RecordMentionError::RecipientNotFound);
        }
        let author = self.profiles.find(author_id).await?;

        let mention = NewMention {
            recipient_user_id: recipient,
            comment_id,
            mentioned_by: MentionAuthor {
                user_id: author_id,
                name: author.as_ref().and_then(|p| p.name.clone()),
                email: author.as_ref().and_then(|p| p.email.clone()),
            },
            comment_excerpt: comment_content.and_then(excerpt),
        };

        let created = self.mentions.insert(mention).await?;
        tracing::info!(mention_id = %created.id, recipient = %recipient, "mention recorded");
        Ok(created)
    }
}

#[async_trait]
impl MentionApi for MentionService {
    async fn list(&self, recipient: Uuid) -> Result<Vec<MentionNotification>, StoreError> {
        MentionService::list(self, recipient).await
    }

    async fn mark_sent(&self, recipient: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        MentionService::mark_sent(self, recipient, ids).await
    }
}
