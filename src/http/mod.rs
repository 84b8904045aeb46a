use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::AuthUser;
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .merge(routes::mentions())
        .merge(routes::notifications())
        .merge(routes::functions(state.dispatch_body_limit_bytes))
        .merge(routes::products())
        .with_state(state)
}
