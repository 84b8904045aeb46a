use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::mention::{MentionAuthor, MentionNotification, NewMention};
use crate::domain::ports::{
    MentionStore, ProductStore, ProfileStore, StoreError, UserNotificationStore,
};
use crate::domain::profile::UserProfile;
use crate::domain::user_notification::{NewUserNotification, NotificationType, UserNotification};
use crate::infra::db::Db;

const MENTION_COLUMNS: &str = "id, recipient_user_id, comment_id, mentioned_by_user_id, \
     mentioned_by_name, mentioned_by_email, comment_excerpt, notification_sent, created_at";

const USER_NOTIFICATION_COLUMNS: &str =
    "id, user_id, brief_id, notification_type, title, message, is_read, created_at";

/// Postgres adapter for every store port.
#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn mention_from_row(row: &PgRow) -> MentionNotification {
    MentionNotification {
        id: row.get("id"),
        recipient_user_id: row.get("recipient_user_id"),
        comment_id: row.get("comment_id"),
        mentioned_by: MentionAuthor {
            user_id: row.get("mentioned_by_user_id"),
            name: row.get("mentioned_by_name"),
            email: row.get("mentioned_by_email"),
        },
        comment_excerpt: row.get("comment_excerpt"),
        created_at: row.get("created_at"),
        notification_sent: row.get("notification_sent"),
    }
}

fn user_notification_from_row(row: &PgRow) -> Result<UserNotification, StoreError> {
    let kind: String = row.get("notification_type");
    let notification_type = kind
        .parse::<NotificationType>()
        .map_err(|_| StoreError::rejected(format!("unknown notification_type {}", kind)))?;

    Ok(UserNotification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        brief_id: row.get("brief_id"),
        notification_type,
        title: row.get("title"),
        message: row.get("message"),
        is_read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl MentionStore for PgStore {
    async fn list_for_recipient(
        &self,
        recipient: Uuid,
    ) -> Result<Vec<MentionNotification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM mention_notifications \
             WHERE recipient_user_id = $1 \
             ORDER BY created_at DESC, id DESC",
            MENTION_COLUMNS
        ))
        .bind(recipient)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(mention_from_row).collect())
    }

    async fn find(&self, id: Uuid) -> Result<Option<MentionNotification>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM mention_notifications WHERE id = $1",
            MENTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(mention_from_row))
    }

    async fn list_since(
        &self,
        since: OffsetDateTime,
    ) -> Result<Vec<MentionNotification>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM mention_notifications \
             WHERE created_at >= $1 \
             ORDER BY created_at ASC, id ASC",
            MENTION_COLUMNS
        ))
        .bind(since)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(mention_from_row).collect())
    }

    async fn insert(&self, mention: NewMention) -> Result<MentionNotification, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO mention_notifications \
             (recipient_user_id, comment_id, mentioned_by_user_id, mentioned_by_name, \
              mentioned_by_email, comment_excerpt) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {}",
            MENTION_COLUMNS
        ))
        .bind(mention.recipient_user_id)
        .bind(mention.comment_id)
        .bind(mention.mentioned_by.user_id)
        .bind(mention.mentioned_by.name)
        .bind(mention.mentioned_by.email)
        .bind(mention.comment_excerpt)
        .fetch_one(self.db.pool())
        .await?;

        Ok(mention_from_row(&row))
    }

    async fn mark_sent(&self, recipient: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE mention_notifications \
             SET notification_sent = true \
             WHERE recipient_user_id = $1 AND id = ANY($2) AND notification_sent = false",
        )
        .bind(recipient)
        .bind(ids)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserNotificationStore for PgStore {
    async fn insert(
        &self,
        notification: NewUserNotification,
    ) -> Result<UserNotification, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO user_notifications \
             (user_id, brief_id, notification_type, title, message, is_read) \
             VALUES ($1, $2, $3, $4, $5, false) \
             RETURNING {}",
            USER_NOTIFICATION_COLUMNS
        ))
        .bind(notification.user_id)
        .bind(notification.brief_id)
        .bind(notification.notification_type.as_str())
        .bind(notification.title)
        .bind(notification.message)
        .fetch_one(self.db.pool())
        .await?;

        user_notification_from_row(&row)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UserNotification>, StoreError> {
        let rows = match cursor {
            Some((created_at, notification_id)) => {
                sqlx::query(&format!(
                    "SELECT {} FROM user_notifications \
                     WHERE user_id = $1 \
                       AND (created_at < $2 OR (created_at = $2 AND id < $3)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $4",
                    USER_NOTIFICATION_COLUMNS
                ))
                .bind(user_id)
                .bind(created_at)
                .bind(notification_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM user_notifications \
                     WHERE user_id = $1 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $2",
                    USER_NOTIFICATION_COLUMNS
                ))
                .bind(user_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        rows.iter().map(user_notification_from_row).collect()
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE user_notifications \
             SET is_read = true \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn find(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, name, company_name, slack_access_token, slack_team_id, \
                    slack_team_name, slack_user_id, slack_channel_id, slack_channel_name, \
                    slack_notifications_enabled \
             FROM user_profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|row| UserProfile {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            company_name: row.get("company_name"),
            slack_access_token: row.get("slack_access_token"),
            slack_team_id: row.get("slack_team_id"),
            slack_team_name: row.get("slack_team_name"),
            slack_user_id: row.get("slack_user_id"),
            slack_channel_id: row.get("slack_channel_id"),
            slack_channel_name: row.get("slack_channel_name"),
            slack_notifications_enabled: row.get("slack_notifications_enabled"),
        }))
    }

    async fn clear_chat_integration(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_profiles \
             SET slack_access_token = NULL, slack_team_id = NULL, slack_team_name = NULL, \
                 slack_user_id = NULL, slack_channel_id = NULL, slack_channel_name = NULL, \
                 slack_notifications_enabled = false \
             WHERE id = $1",
        )
        .bind(user_id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn product_payloads(
        &self,
        source_product_id: Option<Uuid>,
        research_result_id: Option<Uuid>,
    ) -> Result<Vec<Value>, StoreError> {
        if let Some(id) = source_product_id {
            let rows = sqlx::query("SELECT product_data FROM approved_products WHERE id = $1")
                .bind(id)
                .fetch_all(self.db.pool())
                .await?;
            let payloads = product_data(&rows);
            if !payloads.is_empty() || research_result_id.is_none() {
                return Ok(payloads);
            }
        }

        let Some(research_id) = research_result_id else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query(
            "SELECT product_data FROM approved_products \
             WHERE id = $1 OR research_result_id = $1 \
             ORDER BY created_at ASC",
        )
        .bind(research_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(product_data(&rows))
    }
}

fn product_data(rows: &[PgRow]) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| row.get::<Option<Value>, _>("product_data"))
        .collect()
}
