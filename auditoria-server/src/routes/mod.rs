pub mod acciones;
pub mod health;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::infra::app_state::AppState;

pub const HEALTH: &str = "/health";
pub const API_HEALTH: &str = "/api/v1/health";
pub const ACCIONES: &str = "/api/v1/acciones";

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(HEALTH, get(health::liveness))
        .route(API_HEALTH, get(health::gateway_health))
        .route(ACCIONES, post(acciones::publish_action))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
