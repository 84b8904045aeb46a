#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use bofu_notify::app::auth::AuthService;
use bofu_notify::config::decode_key_32;
use bofu_notify::domain::ports::{ChatMessage, ChatSink, EmailRequest, EmailSink, SinkError};
use bofu_notify::domain::profile::UserProfile;
use bofu_notify::infra::feed::{MentionFeed, RelayHealth};
use bofu_notify::infra::memory::MemoryStore;
use bofu_notify::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// "0123456789abcdef0123456789abcdef" (32 bytes), test-only
const TEST_PASETO_ACCESS_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
pub const TEST_BODY_LIMIT: usize = 4 * 1024;

// ---------------------------------------------------------------------------
// Sinks that record what they were asked to deliver
// ---------------------------------------------------------------------------

pub struct RecordingChat {
    outcome: Mutex<Result<(), SinkError>>,
    pub posts: Mutex<Vec<ChatMessage>>,
}

impl RecordingChat {
    pub fn answering(outcome: Result<(), SinkError>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(outcome),
            posts: Mutex::new(Vec::new()),
        })
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn post(&self, message: &ChatMessage) -> Result<(), SinkError> {
        self.posts.lock().unwrap().push(message.clone());
        self.outcome.lock().unwrap().clone()
    }
}

pub struct RecordingEmail {
    outcome: Mutex<Result<(), SinkError>>,
    pub sent: Mutex<Vec<EmailRequest>>,
}

impl RecordingEmail {
    pub fn answering(outcome: Result<(), SinkError>) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(outcome),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailSink for RecordingEmail {
    async fn send(&self, request: &EmailRequest) -> Result<(), SinkError> {
        self.sent.lock().unwrap().push(request.clone());
        self.outcome.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// TestApp: one in-memory backend per test
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub feed: MentionFeed,
    pub chat: Arc<RecordingChat>,
    pub email: Arc<RecordingEmail>,
    auth: AuthService,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body_bytes).into_owned()
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub access_token: String,
}

/// App whose chat and email sinks both succeed.
pub fn app() -> TestApp {
    TestApp::with_sinks(
        RecordingChat::answering(Ok(())),
        RecordingEmail::answering(Ok(())),
    )
}

impl TestApp {
    pub fn with_sinks(chat: Arc<RecordingChat>, email: Arc<RecordingEmail>) -> Self {
        let key = decode_key_32("PASETO_ACCESS_KEY", TEST_PASETO_ACCESS_KEY)
            .expect("test key decodes");
        let feed = MentionFeed::new();
        let store = Arc::new(MemoryStore::new(feed.clone()));

        let state = AppState::new(
            store.clone(),
            feed.clone(),
            chat.clone(),
            email.clone(),
            key,
            60,
        )
        .with_dispatch_body_limit(TEST_BODY_LIMIT);
        let router = bofu_notify::http::router(state.clone());

        TestApp {
            router,
            state,
            store,
            feed,
            chat,
            email,
            auth: AuthService::new(key, 60),
        }
    }

    /// Rebuilds the router with a Postgres relay health flag attached.
    pub fn with_relay(mut self, relay: RelayHealth) -> Self {
        self.state = self.state.with_relay(relay);
        self.router = bofu_notify::http::router(self.state.clone());
        self
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body_bytes,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        self.send(request).await
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::POST, path, None, &headers).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Stores a profile for a fresh user and issues an access token.
    pub fn create_user(&self, name: &str) -> TestUser {
        let id = Uuid::new_v4();
        self.store.put_profile(UserProfile {
            id,
            name: Some(name.to_string()),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            ..Default::default()
        });
        TestUser {
            id,
            access_token: self.token_for(id),
        }
    }

    /// Like `create_user`, with a connected and enabled chat integration.
    pub fn create_chat_user(&self, name: &str) -> TestUser {
        let user = self.create_user(name);
        self.store.put_profile(UserProfile {
            id: user.id,
            name: Some(name.to_string()),
            email: Some(format!("{}@example.com", name.to_lowercase())),
            slack_access_token: Some("xoxb-test".into()),
            slack_team_id: Some("T1".into()),
            slack_team_name: Some("Acme".into()),
            slack_user_id: Some("U1".into()),
            slack_channel_id: Some("C1".into()),
            slack_channel_name: Some("#briefs".into()),
            slack_notifications_enabled: true,
            ..Default::default()
        });
        user
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        self.auth
            .issue_access_token(user_id)
            .expect("issue_access_token failed")
            .token
    }
}
