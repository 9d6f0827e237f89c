use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Router};

use crate::errors::ServiceError;
use crate::handlers::common::success_response;
use crate::AppState;

pub fn slots_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_slots))
}

/// Weekly delivery slot configuration, for the slot picker.
async fn list_slots(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let slots = state.services.slots.list().await?;
    Ok(success_response(slots))
}
