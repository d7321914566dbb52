use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::metrics_middleware;
use super::{dispatchers, handlers, queues, tickets, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::get_metrics))
        // Tickets
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets/waiting", get(tickets::list_waiting))
        .route("/tickets/{id}", get(tickets::get_ticket))
        .route("/tickets/{id}/status", post(tickets::update_status))
        .route("/tickets/{id}/archive", post(tickets::archive_ticket))
        // Queues
        .route("/queues/{id}/stats", get(queues::get_stats))
        .route("/queues/{id}/events", get(queues::replay_events))
        .route("/queues/{id}/worker-updates", post(queues::post_worker_update))
        // Dispatchers
        .route("/dispatchers", get(dispatchers::list_dispatchers))
        .route(
            "/dispatchers/{queue_id}",
            post(dispatchers::start_dispatcher).delete(dispatchers::stop_dispatcher),
        )
        // Live notifier
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
