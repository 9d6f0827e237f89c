pub mod admin_orders;
pub mod auth;
pub mod carts;
pub mod common;
pub mod orders;
pub mod slots;

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::AppState;

/// Full API surface.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .nest("/carts", carts::carts_routes())
        .nest("/orders", orders::orders_routes())
        .nest("/delivery-slots", slots::slots_routes())
        .nest("/admin/orders", admin_orders::admin_orders_routes())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
