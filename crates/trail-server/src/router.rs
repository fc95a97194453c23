use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use trail_protocol::endpoints;
use trail_sync::ReplicationEngine;

use crate::handler;

/// Build the axum router with all node endpoints.
pub fn build_router(engine: Arc<ReplicationEngine>) -> Router {
    Router::new()
        .route(endpoints::RECORDS, get(handler::records_handler))
        .route(endpoints::MINT, post(handler::mint_handler))
        .route(endpoints::HEALTH, get(handler::health_handler))
        .route(endpoints::PEERS, get(handler::peers_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
