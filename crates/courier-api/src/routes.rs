use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use courier_gateway::connection;

use crate::conversations;
use crate::health;
use crate::middleware::require_auth;
use crate::state::AppState;

/// The full HTTP surface: health, the WebSocket gateway at `/ws` and the
/// bearer-protected conversation endpoints.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/conversations", get(conversations::list_conversations))
        .route("/api/conversations/{user_id}", get(conversations::get_conversation))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), state.connection)
    })
}
