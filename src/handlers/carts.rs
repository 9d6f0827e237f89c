use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::entities::PaymentMethod;
use crate::errors::ServiceError;
use crate::handlers::auth::{AuthUser, CartIdentity};
use crate::handlers::common::{success_response, validate_input};
use crate::services::carts::UpsertLineRequest;
use crate::services::checkout::CheckoutOutcome;
use crate::AppState;

pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart).post(upsert_line))
        .route("/check", get(check_cart))
        .route("/merge", post(merge_cart))
        .route("/address/:address_id", put(set_address))
        .route("/delivery-slots/:key", put(set_slot))
        .route("/coupon/:code", put(apply_coupon))
        .route("/coupon", delete(remove_coupon))
        .route("/wallet/apply", put(apply_wallet))
        .route("/wallet/remove", put(remove_wallet))
        .route("/:sku/message", post(set_message))
        .route("/place", put(place_order))
}

/// Current cart, reconciled against the catalog.
async fn get_cart(
    State(state): State<Arc<AppState>>,
    identity: CartIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .current(identity.user_id, identity.anonymous_id.as_deref())
        .await?;
    Ok(success_response(cart))
}

/// Set one line to an absolute quantity; zero removes it.
async fn upsert_line(
    State(state): State<Arc<AppState>>,
    identity: CartIdentity,
    Json(payload): Json<UpsertLineRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .carts
        .upsert_line(identity.user_id, identity.anonymous_id.as_deref(), payload)
        .await?;
    Ok(success_response(cart))
}

/// Report whether every line is still fulfillable.
async fn check_cart(
    State(state): State<Arc<AppState>>,
    identity: CartIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let (cart, ok) = state
        .services
        .carts
        .check(identity.user_id, identity.anonymous_id.as_deref())
        .await?;
    Ok(success_response(json!({ "status": ok, "cart": cart })))
}

/// Fold the anonymous cart named by the header into the user's cart.
async fn merge_cart(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    identity: CartIdentity,
) -> Result<impl IntoResponse, ServiceError> {
    let anonymous_id = identity
        .anonymous_id
        .ok_or_else(|| ServiceError::ValidationError("anonymous cart id required".into()))?;
    let cart = state
        .services
        .carts
        .merge_anonymous(user_id, &anonymous_id)
        .await?;
    Ok(success_response(cart))
}

async fn set_address(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(address_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.set_address(user_id, address_id).await?;
    Ok(success_response(cart))
}

async fn set_slot(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.set_slot(user_id, &key).await?;
    Ok(success_response(cart))
}

async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.apply_coupon(user_id, &code).await?;
    Ok(success_response(cart))
}

async fn remove_coupon(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.remove_coupon(user_id).await?;
    Ok(success_response(cart))
}

async fn apply_wallet(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.apply_wallet(user_id).await?;
    Ok(success_response(cart))
}

async fn remove_wallet(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.remove_wallet(user_id).await?;
    Ok(success_response(cart))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CakeMessageRequest {
    #[validate(length(max = 25))]
    pub message: String,
}

/// Attach a message to the cake with the given SKU.
async fn set_message(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(sku): Path<String>,
    Json(payload): Json<CakeMessageRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .carts
        .set_message(user_id, &sku, &payload.message)
        .await?;
    Ok(success_response(cart))
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderParams {
    #[serde(default, rename = "isWeb")]
    pub is_web: bool,
}

/// Turn the cart into an order. The response tells the client what to
/// do next: nothing for cash on delivery, redirect or in-app payment
/// confirmation for card.
async fn place_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<PlaceOrderParams>,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .services
        .checkout
        .place_order(user_id, payload.method, params.is_web)
        .await?;
    let body = match outcome {
        CheckoutOutcome::Placed { order_id } => json!({
            "status": true,
            "id": order_id,
        }),
        CheckoutOutcome::RedirectToPayment {
            order_id,
            session_id,
        } => json!({
            "status": true,
            "id": order_id,
            "sessionId": session_id,
        }),
        CheckoutOutcome::CollectPayment {
            order_id,
            client_secret,
        } => json!({
            "status": true,
            "id": order_id,
            "clientSecret": client_secret,
        }),
    };
    Ok(success_response(body))
}
