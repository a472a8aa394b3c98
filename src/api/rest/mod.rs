pub mod assignments;
pub mod orders;
pub mod partners;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(orders::router())
        .merge(partners::router())
        .merge(assignments::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/queue", get(queue_depth))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    partners: usize,
    assignments: usize,
    live_assignments: usize,
    queue_depth: usize,
    open_deadlines: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let live_assignments = state
        .assignments
        .iter()
        .filter(|entry| !entry.value().status.is_terminal())
        .count();

    Json(HealthResponse {
        status: "ok",
        orders: state.orders.len(),
        partners: state.partners.len(),
        assignments: state.assignments.len(),
        live_assignments,
        queue_depth: state.queue.len(),
        open_deadlines: state.timeouts.open_deadlines(),
    })
}

#[derive(Serialize)]
struct QueueDepthResponse {
    depth: usize,
}

async fn queue_depth(State(state): State<Arc<AppState>>) -> Json<QueueDepthResponse> {
    Json(QueueDepthResponse {
        depth: state.queue.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
