pub mod errors;
pub mod handlers;
pub mod webhook;

use {
    crate::AppState,
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    std::time::Duration,
    tower_http::timeout::TimeoutLayer,
};

/// Provider events are typically well under 20 KB.
const BODY_LIMIT: usize = 64 * 1024;

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/methods", get(handlers::list_methods))
        .route(
            "/transactions",
            post(handlers::create_intent).get(handlers::history),
        )
        .route("/transactions/{id}", get(handlers::get_transaction))
        .route("/transactions/{id}/confirm", post(handlers::confirm))
        .route("/transactions/{id}/cancel", post(handlers::cancel))
        .route("/transactions/{id}/retry", post(handlers::retry))
        .route("/transactions/{id}/refunds", post(handlers::refund))
        .route("/stats", get(handlers::stats))
        .route("/webhooks/{provider}", post(webhook::receive))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
