use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::coordinator;
use crate::error::AppError;
use crate::models::partner::{GeoPoint, Partner};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/partners", post(register_partner).get(list_partners))
        .route("/partners/:id/verify", post(verify_partner))
        .route("/partners/:id/availability", patch(set_availability))
        .route("/partners/:id/location", patch(update_location))
}

#[derive(Deserialize)]
pub struct RegisterPartnerRequest {
    pub name: String,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

fn default_capacity() -> u32 {
    1
}

#[derive(Deserialize)]
pub struct VerifyPartnerRequest {
    pub approve: bool,
}

#[derive(Deserialize)]
pub struct SetAvailabilityRequest {
    pub available: bool,
    pub location: Option<GeoPoint>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn register_partner(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPartnerRequest>,
) -> Result<Json<Partner>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let partner = Partner::new(payload.name, payload.capacity);
    state.partners.insert(partner.clone());
    Ok(Json(partner))
}

async fn list_partners(State(state): State<Arc<AppState>>) -> Json<Vec<Partner>> {
    Json(state.partners.list())
}

async fn verify_partner(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyPartnerRequest>,
) -> Result<Json<Partner>, AppError> {
    let partner = state.partners.verify(id, payload.approve)?;
    Ok(Json(partner))
}

/// Availability toggle. Going available drains the queue into this partner,
/// up to its capacity, stopping at the first failed attempt.
async fn set_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetAvailabilityRequest>,
) -> Result<Json<Partner>, AppError> {
    let partner = state
        .partners
        .set_availability(id, payload.available, payload.location)?;

    if payload.available {
        coordinator::drain_into_partner(&state, partner.id, partner.capacity);
    }

    // The drain may have flipped the partner to OnDelivery; report fresh state.
    let current = state.partners.get(id).unwrap_or(partner);
    Ok(Json(current))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Partner>, AppError> {
    let partner = state.partners.update_location(id, payload.location)?;
    Ok(Json(partner))
}
