use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::coordinator;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/:id/accept", post(accept))
        .route("/assignments/:id/reject", post(reject))
        .route("/assignments/:id/picked", post(picked))
        .route("/assignments/:id/delivered", post(delivered))
}

/// Every partner action carries the acting partner; a mismatch against the
/// assignment is a conflict, same as a wrong-stage action.
#[derive(Deserialize)]
pub struct PartnerActionRequest {
    pub partner_id: Uuid,
}

async fn list_assignments(State(state): State<Arc<AppState>>) -> Json<Vec<Assignment>> {
    let assignments = state
        .assignments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Json(assignments)
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<StatusCode, AppError> {
    coordinator::partner_accepts(&state, id, payload.partner_id)?;
    Ok(StatusCode::OK)
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<StatusCode, AppError> {
    coordinator::partner_rejects(&state, id, payload.partner_id)?;
    Ok(StatusCode::OK)
}

async fn picked(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<StatusCode, AppError> {
    coordinator::partner_picked(&state, id, payload.partner_id)?;
    Ok(StatusCode::OK)
}

async fn delivered(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartnerActionRequest>,
) -> Result<StatusCode, AppError> {
    coordinator::partner_delivered(&state, id, payload.partner_id)?;
    Ok(StatusCode::OK)
}
