//! Per-recipient push channel for newly committed mention notifications.
//!
//! [`MentionFeed`] is an in-process hub. Writers (the Postgres relay or the
//! memory store) call [`MentionFeed::publish`]; readers hold a
//! [`Subscription`] whose callback runs for every record addressed to their
//! recipient from the moment of subscription onward.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sqlx::postgres::PgListener;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::mention::MentionNotification;
use crate::domain::ports::{MentionStore, StoreError};
use crate::infra::db::Db;

pub const MENTION_CHANNEL: &str = "mention_notifications";

type Callback = Box<dyn Fn(&MentionNotification) + Send + Sync>;

/// Holds the callback until unsubscribe. The lock is held for the whole
/// callback invocation, so clearing it waits out any delivery in flight.
struct Slot {
    callback: Mutex<Option<Callback>>,
}

impl Slot {
    fn callback(&self) -> MutexGuard<'_, Option<Callback>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct Registry {
    by_recipient: HashMap<Uuid, Vec<(u64, Arc<Slot>)>>,
}

#[derive(Clone, Default)]
pub struct MentionFeed {
    registry: Arc<Mutex<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl MentionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `callback` for records addressed to `recipient`.
    ///
    /// The callback must not unsubscribe its own handle.
    pub fn subscribe<F>(&self, recipient: Uuid, callback: F) -> Subscription
    where
        F: Fn(&MentionNotification) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot {
            callback: Mutex::new(Some(Box::new(callback))),
        });
        self.registry()
            .by_recipient
            .entry(recipient)
            .or_default()
            .push((id, slot.clone()));
        debug!(%recipient, subscription_id = id, "mention feed subscribed");

        Subscription {
            id,
            recipient,
            slot,
            feed: self.clone(),
            active: true,
        }
    }

    /// Delivers `notification` to every live subscriber of its recipient.
    /// Returns how many callbacks ran.
    pub fn publish(&self, notification: &MentionNotification) -> usize {
        let slots: Vec<Arc<Slot>> = self
            .registry()
            .by_recipient
            .get(&notification.recipient_user_id)
            .map(|slots| slots.iter().map(|(_, slot)| slot.clone()).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for slot in slots {
            let guard = slot.callback();
            if let Some(callback) = guard.as_ref() {
                callback(notification);
                delivered += 1;
            }
        }
        delivered
    }

    /// Subscribes through a channel of `capacity` records. When the reader
    /// falls behind, further records are dropped and logged instead of
    /// queued; the reader recovers them by reloading from the store.
    pub fn subscribe_bounded(
        &self,
        recipient: Uuid,
        capacity: usize,
    ) -> (Subscription, mpsc::Receiver<MentionNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        let subscription = self.subscribe(recipient, move |notification| {
            if let Err(TrySendError::Full(dropped)) = tx.try_send(notification.clone()) {
                warn!(%recipient, mention_id = %dropped.id, "subscriber lagging, mention dropped");
            }
        });
        (subscription, rx)
    }

    pub fn subscriber_count(&self, recipient: Uuid) -> usize {
        self.registry()
            .by_recipient
            .get(&recipient)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn remove(&self, recipient: Uuid, id: u64) {
        let mut registry = self.registry();
        if let Some(slots) = registry.by_recipient.get_mut(&recipient) {
            slots.retain(|(slot_id, _)| *slot_id != id);
            if slots.is_empty() {
                registry.by_recipient.remove(&recipient);
            }
        }
    }
}

/// Live registration on a [`MentionFeed`]. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    recipient: Uuid,
    slot: Arc<Slot>,
    feed: MentionFeed,
    active: bool,
}

impl Subscription {
    pub fn recipient(&self) -> Uuid {
        self.recipient
    }

    /// After this returns the callback is never invoked again.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.feed.remove(self.recipient, self.id);
        self.slot.callback().take();
        debug!(recipient = %self.recipient, subscription_id = self.id, "mention feed unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("recipient", &self.recipient)
            .field("active", &self.active)
            .finish()
    }
}

/// Shared view of whether the Postgres relay is currently listening.
#[derive(Clone, Default)]
pub struct RelayHealth {
    connected: Arc<AtomicBool>,
}

impl RelayHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

/// Publishes every stored mention created at or after `since`, oldest first.
/// Returns the newest `created_at` seen, or `since` when nothing matched.
pub async fn replay_since(
    store: &dyn MentionStore,
    feed: &MentionFeed,
    since: OffsetDateTime,
) -> Result<OffsetDateTime, StoreError> {
    let missed = store.list_since(since).await?;
    let mut newest = since;
    for mention in &missed {
        feed.publish(mention);
        newest = newest.max(mention.created_at);
    }
    if !missed.is_empty() {
        info!(count = missed.len(), "replayed mentions created while disconnected");
    }
    Ok(newest)
}

/// Bridges Postgres `NOTIFY` on [`MENTION_CHANNEL`] into a [`MentionFeed`].
///
/// The trigger sends the new row id; the relay loads the row and publishes
/// it. `NOTIFY`s sent while the listener is down are lost, so every
/// (re)connect replays rows created since the newest one relayed. Subscribers
/// can therefore see a record twice and must dedupe by id.
pub struct PgFeedRelay {
    db: Db,
    store: Arc<dyn MentionStore>,
    feed: MentionFeed,
    health: RelayHealth,
}

const RETRY_MIN: Duration = Duration::from_secs(1);
const RETRY_MAX: Duration = Duration::from_secs(30);

/// `created_at` is the inserting transaction's start time, so rows can
/// commit out of timestamp order. Replays reach back this far.
const REPLAY_SLACK: time::Duration = time::Duration::seconds(5);

impl PgFeedRelay {
    pub fn new(
        db: Db,
        store: Arc<dyn MentionStore>,
        feed: MentionFeed,
        health: RelayHealth,
    ) -> Self {
        Self {
            db,
            store,
            feed,
            health,
        }
    }

    /// Runs until the task is dropped. Connection failures are retried with
    /// exponential backoff.
    pub async fn run(self) {
        let mut newest = OffsetDateTime::now_utc();
        let mut backoff = RETRY_MIN;

        loop {
            let mut listener = match self.listen().await {
                Ok(listener) => listener,
                Err(err) => {
                    self.health.set_connected(false);
                    warn!(error = ?err, retry_in = ?backoff, "mention feed relay cannot listen");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RETRY_MAX);
                    continue;
                }
            };

            // listening again before the replay leaves no window uncovered
            match replay_since(&*self.store, &self.feed, newest - REPLAY_SLACK).await {
                Ok(replayed) => newest = newest.max(replayed),
                Err(err) => {
                    error!(error = ?err, retry_in = ?backoff, "mention feed replay failed");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RETRY_MAX);
                    continue;
                }
            }
            backoff = RETRY_MIN;
            self.health.set_connected(true);
            info!(channel = MENTION_CHANNEL, "mention feed relay listening");

            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        if let Some(created_at) = self.relay(notification.payload()).await {
                            newest = newest.max(created_at);
                        }
                    }
                    Ok(None) => {
                        warn!("mention feed relay lost its connection");
                        break;
                    }
                    Err(err) => {
                        error!(error = ?err, "mention feed relay receive failed");
                        break;
                    }
                }
            }
            self.health.set_connected(false);
        }
    }

    async fn listen(&self) -> Result<PgListener, sqlx::Error> {
        let mut listener = PgListener::connect_with(self.db.pool()).await?;
        listener.listen(MENTION_CHANNEL).await?;
        Ok(listener)
    }

    /// Loads and publishes one notified row, returning its `created_at`.
    async fn relay(&self, payload: &str) -> Option<OffsetDateTime> {
        let id = match Uuid::parse_str(payload.trim()) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = ?err, payload, "ignoring malformed mention payload");
                return None;
            }
        };

        match self.store.find(id).await {
            Ok(Some(mention)) => {
                let delivered = self.feed.publish(&mention);
                debug!(mention_id = %id, delivered, "relayed mention notification");
                Some(mention.created_at)
            }
            Ok(None) => {
                warn!(mention_id = %id, "notified mention row not found");
                None
            }
            Err(err) => {
                error!(error = ?err, mention_id = %id, "failed to load notified mention");
                None
            }
        }
    }
}
