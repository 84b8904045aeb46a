//! Client-side notification center.
//!
//! Holds a derived copy of the recipient's mention notifications, merges
//! fetched history with pushed records, and issues read-state mutations.
//! The unread count is always recounted from the records. Count changes are
//! published on an injected [`BadgeBus`] so sibling surfaces (a header badge)
//! stay in step without their own subscription.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::mention::{sort_newest_first, MentionNotification};
use crate::domain::ports::StoreError;
use crate::infra::feed::{MentionFeed, Subscription};

/// Fetch/mutate surface the center talks to.
#[async_trait]
pub trait MentionApi: Send + Sync {
    async fn list(&self, recipient: Uuid) -> Result<Vec<MentionNotification>, StoreError>;

    async fn mark_sent(&self, recipient: Uuid, ids: &[Uuid]) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Hidden,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    Unread,
    Mentions,
}

impl Filter {
    pub fn matches(&self, notification: &MentionNotification) -> bool {
        match self {
            Filter::All | Filter::Mentions => true,
            Filter::Unread => !notification.notification_sent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    Mention { from: String },
    Success(String),
    Failure(String),
}

#[derive(Debug, thiserror::Error)]
#[error("alert could not be shown: {0}")]
pub struct AlertError(pub String);

/// Toasts, sounds and the like. Failures never fail a center transition.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Default sink that only logs.
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn alert(&self, alert: &Alert) -> Result<(), AlertError> {
        match alert {
            Alert::Mention { from } => tracing::info!(from = %from, "new mention"),
            Alert::Success(message) => tracing::info!(%message, "notification center"),
            Alert::Failure(message) => tracing::warn!(%message, "notification center"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BadgeCount {
    pub recipient: Option<Uuid>,
    pub unread: usize,
}

/// Shared unread badge. Inject one bus into every surface that shows or
/// changes the count.
#[derive(Clone)]
pub struct BadgeBus {
    tx: Arc<watch::Sender<BadgeCount>>,
}

impl BadgeBus {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BadgeCount::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<BadgeCount> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> BadgeCount {
        *self.tx.borrow()
    }

    fn publish(&self, count: BadgeCount) {
        self.tx.send_replace(count);
    }
}

impl Default for BadgeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CenterError {
    #[error("no authenticated recipient")]
    NoRecipient,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabCounts {
    pub all: usize,
    pub unread: usize,
    pub mentions: usize,
}

/// Puts the phase back to `Ready` however the fetch ends, including when the
/// future is dropped mid-flight.
struct LoadingGuard<'a> {
    phase: &'a mut Phase,
}

impl<'a> LoadingGuard<'a> {
    fn enter(phase: &'a mut Phase) -> Self {
        *phase = Phase::Loading;
        Self { phase }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        *self.phase = Phase::Ready;
    }
}

pub struct NotificationCenter {
    api: Arc<dyn MentionApi>,
    feed: MentionFeed,
    badge: BadgeBus,
    alerts: Arc<dyn AlertSink>,
    recipient: Option<Uuid>,
    subscription: Option<Subscription>,
    pushes_tx: mpsc::UnboundedSender<MentionNotification>,
    pushes_rx: mpsc::UnboundedReceiver<MentionNotification>,
    phase: Phase,
    filter: Filter,
    notifications: Vec<MentionNotification>,
}

impl NotificationCenter {
    pub fn new(
        api: Arc<dyn MentionApi>,
        feed: MentionFeed,
        badge: BadgeBus,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let (pushes_tx, pushes_rx) = mpsc::unbounded_channel();
        Self {
            api,
            feed,
            badge,
            alerts,
            recipient: None,
            subscription: None,
            pushes_tx,
            pushes_rx,
            phase: Phase::Hidden,
            filter: Filter::All,
            notifications: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn recipient(&self) -> Option<Uuid> {
        self.recipient
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
    }

    pub fn notifications(&self) -> &[MentionNotification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.notifications
            .iter()
            .filter(|n| !n.notification_sent)
            .count()
    }

    /// Records passing the current filter, newest first.
    pub fn visible(&self) -> Vec<&MentionNotification> {
        self.notifications
            .iter()
            .filter(|n| self.filter.matches(n))
            .collect()
    }

    pub fn tab_counts(&self) -> TabCounts {
        TabCounts {
            all: self.notifications.len(),
            unread: self.unread_count(),
            mentions: self.notifications.len(),
        }
    }

    /// Binds the center to a recipient. The push subscription is re-acquired
    /// only when the identity changes; `None` releases it.
    pub fn set_recipient(&mut self, recipient: Option<Uuid>) {
        if self.recipient == recipient {
            return;
        }
        self.recipient = recipient;
        self.notifications.clear();
        self.phase = Phase::Hidden;
        // pushes queued for the prior recipient
        while self.pushes_rx.try_recv().is_ok() {}
        self.resubscribe();
        self.refresh_badge();
    }

    /// Tears down the current push subscription, if any, and opens a fresh
    /// one for the current recipient. Pushes already queued are kept.
    pub fn resubscribe(&mut self) {
        if let Some(prior) = self.subscription.take() {
            prior.unsubscribe();
        }

        if let Some(recipient) = self.recipient {
            let tx = self.pushes_tx.clone();
            self.subscription = Some(self.feed.subscribe(recipient, move |notification| {
                let _ = tx.send(notification.clone());
            }));
            debug!(%recipient, "notification center subscribed");
        }
    }

    /// `Hidden → Loading → Ready`. A failed fetch still ends in `Ready`,
    /// keeping whatever was held before, and raises a failure alert.
    pub async fn show(&mut self) -> Result<(), CenterError> {
        let recipient = self.recipient.ok_or(CenterError::NoRecipient)?;
        let api = self.api.clone();

        let result = {
            let _loading = LoadingGuard::enter(&mut self.phase);
            api.list(recipient).await
        };

        match result {
            Ok(mut fetched) => {
                sort_newest_first(&mut fetched);
                fetched.dedup_by_key(|n| n.id);
                fetched.retain(|n| n.recipient_user_id == recipient);
                self.notifications = fetched;
                self.refresh_badge();
                Ok(())
            }
            Err(err) => {
                warn!(error = ?err, %recipient, "failed to load notifications");
                self.raise(Alert::Failure("Failed to load notifications".into()));
                Err(err.into())
            }
        }
    }

    pub fn hide(&mut self) {
        self.phase = Phase::Hidden;
    }

    /// Merges one pushed record. Returns false for records already held or
    /// addressed to someone else.
    pub fn apply_push(&mut self, notification: MentionNotification) -> bool {
        if self.recipient != Some(notification.recipient_user_id) {
            return false;
        }
        if self.notifications.iter().any(|n| n.id == notification.id) {
            debug!(mention_id = %notification.id, "duplicate push ignored");
            return false;
        }

        let position = self
            .notifications
            .iter()
            .position(|n| {
                (n.created_at, n.id) < (notification.created_at, notification.id)
            })
            .unwrap_or(self.notifications.len());
        let from = notification.mentioned_by.label();
        self.notifications.insert(position, notification);

        self.refresh_badge();
        self.raise(Alert::Mention { from });
        true
    }

    /// Applies every push queued so far without waiting.
    pub fn pump_pushes(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(notification) = self.pushes_rx.try_recv() {
            if self.apply_push(notification) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next push and applies it.
    pub async fn next_push(&mut self) -> bool {
        match self.pushes_rx.recv().await {
            Some(notification) => self.apply_push(notification),
            None => false,
        }
    }

    /// Optimistically flips one record, then tells the store. A store failure
    /// rolls the flip back and raises a failure alert.
    pub async fn mark_read(&mut self, id: Uuid) -> Result<bool, CenterError> {
        let recipient = self.recipient.ok_or(CenterError::NoRecipient)?;
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) if !notification.notification_sent => {
                notification.notification_sent = true;
            }
            _ => return Ok(false),
        }
        self.refresh_badge();

        match self.api.mark_sent(recipient, &[id]).await {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!(error = ?err, mention_id = %id, "failed to mark notification read");
                if let Some(notification) = self.notifications.iter_mut().find(|n| n.id == id) {
                    notification.notification_sent = false;
                }
                self.refresh_badge();
                self.raise(Alert::Failure("Failed to mark as read".into()));
                Err(err.into())
            }
        }
    }

    /// One batch mutation for every unread record. Local flags change only
    /// after the store accepts it.
    pub async fn mark_all_read(&mut self) -> Result<usize, CenterError> {
        let recipient = self.recipient.ok_or(CenterError::NoRecipient)?;
        let unread: Vec<Uuid> = self
            .notifications
            .iter()
            .filter(|n| !n.notification_sent)
            .map(|n| n.id)
            .collect();
        if unread.is_empty() {
            return Ok(0);
        }

        if let Err(err) = self.api.mark_sent(recipient, &unread).await {
            warn!(error = ?err, count = unread.len(), "failed to mark all notifications read");
            self.raise(Alert::Failure("Failed to mark all as read".into()));
            return Err(err.into());
        }

        for notification in self.notifications.iter_mut() {
            if unread.contains(&notification.id) {
                notification.notification_sent = true;
            }
        }
        self.refresh_badge();
        self.raise(Alert::Success("All notifications marked as read".into()));
        Ok(unread.len())
    }

    fn refresh_badge(&self) {
        self.badge.publish(BadgeCount {
            recipient: self.recipient,
            unread: self.unread_count(),
        });
    }

    fn raise(&self, alert: Alert) {
        if let Err(err) = self.alerts.alert(&alert) {
            warn!(error = %err, "alert dropped");
        }
    }
}
