use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::engine::coordinator;
use crate::error::AppError;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/confirm", post(confirm_order))
}

async fn create_order(State(state): State<Arc<AppState>>) -> Json<Order> {
    let order = Order::new();
    state.orders.insert(order.clone());
    Json(order)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(id)
        .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

    Ok(Json(order))
}

/// Payment-confirmed trigger: queues the order at the tail, then makes a
/// best-effort pass over available partners so the work does not sit idle
/// until the next availability toggle.
async fn confirm_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.confirm(id)?;
    state.queue.push_back(order.id);
    state.metrics.orders_in_queue.set(state.queue.len() as i64);

    coordinator::scan_available_partners(&state);

    // Re-read: the scan may already have handed the order off.
    let current = state.orders.get(id).unwrap_or(order);
    Ok(Json(current))
}
