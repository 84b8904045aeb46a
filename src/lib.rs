pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use crate::domain::ports::{
    ChatSink, EmailSink, MentionStore, ProductStore, ProfileStore, UserNotificationStore,
};
use crate::infra::{
    db::Db,
    feed::{MentionFeed, RelayHealth},
};

const DEFAULT_DISPATCH_BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Option<Db>,
    pub relay: Option<RelayHealth>,
    pub mentions: Arc<dyn MentionStore>,
    pub user_notifications: Arc<dyn UserNotificationStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub products: Arc<dyn ProductStore>,
    pub chat: Arc<dyn ChatSink>,
    pub email: Arc<dyn EmailSink>,
    pub feed: MentionFeed,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub dispatch_body_limit_bytes: usize,
}

impl AppState {
    /// Wires every store port to one backend.
    pub fn new<S>(
        store: Arc<S>,
        feed: MentionFeed,
        chat: Arc<dyn ChatSink>,
        email: Arc<dyn EmailSink>,
        paseto_access_key: [u8; 32],
        access_ttl_minutes: u64,
    ) -> Self
    where
        S: MentionStore + UserNotificationStore + ProfileStore + ProductStore + 'static,
    {
        Self {
            db: None,
            relay: None,
            mentions: store.clone(),
            user_notifications: store.clone(),
            profiles: store.clone(),
            products: store,
            chat,
            email,
            feed,
            paseto_access_key,
            access_ttl_minutes,
            dispatch_body_limit_bytes: DEFAULT_DISPATCH_BODY_LIMIT,
        }
    }

    pub fn with_db(mut self, db: Db) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_relay(mut self, relay: RelayHealth) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn with_dispatch_body_limit(mut self, bytes: usize) -> Self {
        self.dispatch_body_limit_bytes = bytes;
        self
    }
}
