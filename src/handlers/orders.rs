use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use serde_json::json;

use crate::errors::ServiceError;
use crate::handlers::auth::AuthUser;
use crate::handlers::common::success_response;
use crate::AppState;

pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", put(cancel_order))
        .route("/:id/cod", put(convert_to_cod))
        .route("/payments/:payment_id", get(payment_status))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_for_user(user_id).await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, lines) = state
        .services
        .orders
        .detail_for_user(user_id, order_id)
        .await?;
    Ok(success_response(json!({ "order": order, "lines": lines })))
}

/// Customers can cancel only while the order is still pending.
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .cancel_by_user(user_id, order_id)
        .await?;
    Ok(success_response(order))
}

/// Fall back to cash on delivery when the card payment was abandoned.
async fn convert_to_cod(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .convert_to_cod(user_id, order_id)
        .await?;
    Ok(success_response(order))
}

/// Poll the gateway for a card payment and record the outcome.
async fn payment_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let (order, status) = state
        .services
        .checkout
        .payment_status(user_id, &payment_id)
        .await?;
    Ok(success_response(
        json!({ "order": order, "paymentStatus": status }),
    ))
}
