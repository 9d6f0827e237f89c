use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::put,
    Router,
};
use serde::Deserialize;

use crate::entities::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::common::success_response;
use crate::AppState;

/// Back-office order management. Sits behind the admin gateway; no
/// customer identity headers here.
pub fn admin_orders_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id/status", put(update_status))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

/// Move an order through its lifecycle. Cancelling restores stock and
/// refunds the customer's wallet.
async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_status(order_id, payload.status)
        .await?;
    Ok(success_response(order))
}
