// Route modules
pub mod ledger;

use crate::{app_state::AppState, middleware::logging_middleware};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Request bodies are tiny JSON documents
const MAX_BODY_BYTES: usize = 10 * 1024;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<AppState> {
    let ledger_routes = Router::new()
        .route("/transactions", post(ledger::create_transaction))
        .route("/users/{id}/balance", get(ledger::get_user_balance))
        .route("/users/{id}/entries", get(ledger::get_user_entries));

    // Invoked by an external scheduler
    let maintenance_routes =
        Router::new().route("/maintenance/sweep", post(ledger::sweep_expired));

    // Combine all routes with request/response body logging
    Router::new()
        .merge(ledger_routes)
        .merge(maintenance_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(logging_middleware))
}
