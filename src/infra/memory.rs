//! In-process store used by `STORE_BACKEND=memory` and the test suites.
//!
//! Inserted mentions are published to the attached [`MentionFeed`] directly,
//! standing in for the Postgres trigger and relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::mention::{sort_newest_first, MentionNotification, NewMention};
use crate::domain::ports::{
    MentionStore, ProductStore, ProfileStore, StoreError, UserNotificationStore,
};
use crate::domain::profile::UserProfile;
use crate::domain::user_notification::{NewUserNotification, UserNotification};
use crate::infra::feed::MentionFeed;

#[derive(Debug, Clone)]
pub struct ProductRow {
    pub id: Uuid,
    pub research_result_id: Option<Uuid>,
    pub product_data: Value,
}

#[derive(Default)]
struct Tables {
    mentions: Vec<MentionNotification>,
    user_notifications: Vec<UserNotification>,
    profiles: HashMap<Uuid, UserProfile>,
    products: Vec<ProductRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    feed: Option<MentionFeed>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new(feed: MentionFeed) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    /// Simulates an outage: every call fails with `StoreError::Unavailable`
    /// until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn put_profile(&self, profile: UserProfile) {
        self.tables().profiles.insert(profile.id, profile);
    }

    pub fn profile(&self, user_id: Uuid) -> Option<UserProfile> {
        self.tables().profiles.get(&user_id).cloned()
    }

    pub fn put_product(&self, row: ProductRow) {
        self.tables().products.push(row);
    }

    pub fn user_notifications_for(&self, user_id: Uuid) -> Vec<UserNotification> {
        self.tables()
            .user_notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MentionStore for MemoryStore {
    async fn list_for_recipient(
        &self,
        recipient: Uuid,
    ) -> Result<Vec<MentionNotification>, StoreError> {
        self.check()?;
        let mut items: Vec<MentionNotification> = self
            .tables()
            .mentions
            .iter()
            .filter(|m| m.recipient_user_id == recipient)
            .cloned()
            .collect();
        sort_newest_first(&mut items);
        Ok(items)
    }

    async fn find(&self, id: Uuid) -> Result<Option<MentionNotification>, StoreError> {
        self.check()?;
        Ok(self.tables().mentions.iter().find(|m| m.id == id).cloned())
    }

    async fn list_since(
        &self,
        since: OffsetDateTime,
    ) -> Result<Vec<MentionNotification>, StoreError> {
        self.check()?;
        let mut items: Vec<MentionNotification> = self
            .tables()
            .mentions
            .iter()
            .filter(|m| m.created_at >= since)
            .cloned()
            .collect();
        items.sort_by_key(|m| (m.created_at, m.id));
        Ok(items)
    }

    async fn insert(&self, mention: NewMention) -> Result<MentionNotification, StoreError> {
        self.check()?;
        let row = MentionNotification {
            id: Uuid::new_v4(),
            recipient_user_id: mention.recipient_user_id,
            comment_id: mention.comment_id,
            mentioned_by: mention.mentioned_by,
            comment_excerpt: mention.comment_excerpt,
            created_at: OffsetDateTime::now_utc(),
            notification_sent: false,
        };
        self.tables().mentions.push(row.clone());

        if let Some(feed) = &self.feed {
            feed.publish(&row);
        }
        Ok(row)
    }

    async fn mark_sent(&self, recipient: Uuid, ids: &[Uuid]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.check()?;
        let mut updated = 0;
        for mention in self.tables().mentions.iter_mut() {
            if mention.recipient_user_id == recipient
                && ids.contains(&mention.id)
                && !mention.notification_sent
            {
                mention.notification_sent = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl UserNotificationStore for MemoryStore {
    async fn insert(
        &self,
        notification: NewUserNotification,
    ) -> Result<UserNotification, StoreError> {
        self.check()?;
        let row = UserNotification {
            id: Uuid::new_v4(),
            user_id: notification.user_id,
            brief_id: notification.brief_id,
            notification_type: notification.notification_type,
            title: notification.title,
            message: notification.message,
            is_read: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables().user_notifications.push(row.clone());
        Ok(row)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UserNotification>, StoreError> {
        self.check()?;
        let mut items: Vec<UserNotification> = self
            .tables()
            .user_notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .filter(|n| match cursor {
                Some((created_at, id)) => {
                    n.created_at < created_at || (n.created_at == created_at && n.id < id)
                }
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        items.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(items)
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables();
        match tables
            .user_notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        self.check()?;
        Ok(self.profile(user_id))
    }

    async fn clear_chat_integration(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.check()?;
        if let Some(profile) = self.tables().profiles.get_mut(&user_id) {
            profile.clear_chat_integration();
        }
        Ok(())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn product_payloads(
        &self,
        source_product_id: Option<Uuid>,
        research_result_id: Option<Uuid>,
    ) -> Result<Vec<Value>, StoreError> {
        self.check()?;
        let tables = self.tables();
        if let Some(id) = source_product_id {
            let matches: Vec<Value> = tables
                .products
                .iter()
                .filter(|row| row.id == id)
                .map(|row| row.product_data.clone())
                .collect();
            if !matches.is_empty() || research_result_id.is_none() {
                return Ok(matches);
            }
        }

        let Some(research_id) = research_result_id else {
            return Ok(Vec::new());
        };
        Ok(tables
            .products
            .iter()
            .filter(|row| row.id == research_id || row.research_result_id == Some(research_id))
            .map(|row| row.product_data.clone())
            .collect())
    }
}
