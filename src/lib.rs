pub mod config;
pub mod error;
pub mod state;
pub mod auth;
pub mod accounts;
pub mod db;
pub mod models;
pub mod routes;
pub mod rate_limit;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::accounts::Accounts;
use crate::auth::token::TokenCodec;
use crate::config::Config;
use crate::db::{PostStore, UserStore};
use crate::rate_limit::LoginRateLimiter;
use crate::state::{AppState, SharedState};

pub fn build_app(
    users: Arc<dyn UserStore>,
    posts: Arc<dyn PostStore>,
    config: Config,
) -> (Router, SharedState) {
    let codec = TokenCodec::new(&config.secret_key);
    let accounts = Accounts::new(users, codec, config.token_max_age);

    let state: SharedState = Arc::new(AppState {
        config,
        accounts,
        posts,
        login_limiter: LoginRateLimiter::new(),
    });

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
