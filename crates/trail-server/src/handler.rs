use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use tracing::debug;
use trail_ledger::Record;
use trail_protocol::{HealthResponse, MintRequest};
use trail_sync::{PeerInfo, ReplicationEngine};
use trail_types::Payload;

use crate::error::ApiError;

pub type EngineState = State<Arc<ReplicationEngine>>;

/// `GET /records`: the full chain.
pub async fn records_handler(State(engine): EngineState) -> Json<Vec<Record>> {
    Json(engine.records())
}

/// `POST /mint`: append a record and announce it to every peer.
pub async fn mint_handler(
    State(engine): EngineState,
    body: Result<Json<MintRequest>, JsonRejection>,
) -> Result<Json<Record>, ApiError> {
    let Json(request) = body.map_err(|e| {
        debug!(error = %e, "unreadable mint body");
        ApiError::MissingData
    })?;
    let payload = Payload::from_json(request.data.as_ref()).map_err(|_| ApiError::MissingData)?;
    Ok(Json(engine.mint(payload)))
}

pub async fn health_handler(State(engine): EngineState) -> Json<HealthResponse> {
    Json(HealthResponse::new(engine.ledger_len(), engine.open_link_count()))
}

pub async fn peers_handler(State(engine): EngineState) -> Json<Vec<PeerInfo>> {
    Json(engine.peers())
}
