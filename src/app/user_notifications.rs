use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::ports::{StoreError, UserNotificationStore};
use crate::domain::user_notification::UserNotification;

#[derive(Clone)]
pub struct UserNotificationService {
    store: Arc<dyn UserNotificationStore>,
}

impl UserNotificationService {
    pub fn new(store: Arc<dyn UserNotificationStore>) -> Self {
        Self { store }
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<UserNotification>, StoreError> {
        self.store.list_for_user(user_id, cursor, limit).await
    }

    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.store.mark_read(notification_id, user_id).await
    }
}
