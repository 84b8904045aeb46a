use anyhow::anyhow;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bofu_notify::config::{AppConfig, StoreBackend};
use bofu_notify::domain::ports::{ChatSink, EmailSink};
use bofu_notify::http;
use bofu_notify::infra::{
    db::Db,
    email::FunctionEmailSink,
    feed::{MentionFeed, PgFeedRelay, RelayHealth},
    memory::MemoryStore,
    postgres::PgStore,
    slack::SlackChatSink,
};
use bofu_notify::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let sink_timeout = Duration::from_secs(config.sink_timeout_seconds);
    let chat: Arc<dyn ChatSink> =
        Arc::new(SlackChatSink::new(config.slack_api_base.clone(), sink_timeout)?);
    let email: Arc<dyn EmailSink> = Arc::new(FunctionEmailSink::new(
        config.email_function_url.clone(),
        config.email_function_key.clone(),
        sink_timeout,
    )?);
    if config.email_function_url.is_none() {
        tracing::warn!("EMAIL_FUNCTION_URL not set, email delivery disabled");
    }

    let feed = MentionFeed::new();
    let state = match config.store_backend {
        StoreBackend::Postgres => {
            let db = Db::connect(&config).await?;
            let store = Arc::new(PgStore::new(db.clone()));

            let health = RelayHealth::new();
            let relay = PgFeedRelay::new(db.clone(), store.clone(), feed.clone(), health.clone());
            tokio::spawn(relay.run());

            AppState::new(
                store,
                feed,
                chat,
                email,
                config.paseto_access_key,
                config.access_ttl_minutes,
            )
            .with_db(db)
            .with_relay(health)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store, data is lost on restart");
            AppState::new(
                Arc::new(MemoryStore::new(feed.clone())),
                feed,
                chat,
                email,
                config.paseto_access_key,
                config.access_ttl_minutes,
            )
        }
    }
    .with_dispatch_body_limit(config.dispatch_body_limit_bytes);

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
