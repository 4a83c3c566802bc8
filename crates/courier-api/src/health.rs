use axum::{Json, extract::State};

use courier_types::api::HealthResponse;

use crate::state::AppState;

/// GET /health — unauthenticated liveness plus the current presence count.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        service: "courier".into(),
        active_users: state.dispatcher.active_users(),
    })
}
