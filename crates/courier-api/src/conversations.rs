use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;

use courier_gateway::Identity;
use courier_types::api::{ConversationListResponse, ConversationResponse};
use courier_types::models::{ConversationSummary, MessagePayload, UserId};

use crate::state::AppState;

const MAX_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

/// GET /api/conversations/{user_id} — messages between the caller and
/// `user_id`, oldest first. `offset` counts back from the newest message.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(other_id): Path<UserId>,
    Query(query): Query<ConversationQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let offset = query.offset;
    let me = identity.user_id;

    // Fetched newest first so LIMIT picks the latest page
    let rows = tokio::task::spawn_blocking(move || db.get_conversation(me, other_id, limit, offset))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB get_conversation error for {} <-> {}: {}", me, other_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let mut messages: Vec<MessagePayload> = rows.into_iter().map(Into::into).collect();
    messages.reverse();

    Ok(Json(ConversationResponse { messages }))
}

/// GET /api/conversations — one entry per partner, most recent first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let me = identity.user_id;

    let rows = tokio::task::spawn_blocking(move || db.list_conversations(me))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB list_conversations error for {}: {}", me, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let conversations: Vec<ConversationSummary> = rows.into_iter().map(Into::into).collect();
    Ok(Json(ConversationListResponse { conversations }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use tower_http::cors::CorsLayer;

    use courier_db::Database;
    use courier_gateway::TokenVerifier;
    use courier_gateway::connection::ConnectionSettings;
    use courier_types::models::UserType;

    use super::*;
    use crate::state::AppStateInner;

    const SECRET: &str = "test-secret";

    fn app() -> (Router, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.seed_user(1, "creator@example.com", UserType::Creator).unwrap();
        db.seed_user(2, "brand@example.com", UserType::Brand).unwrap();
        db.seed_user(3, "other@example.com", UserType::Brand).unwrap();
        let state = AppStateInner::new(
            db.clone(),
            TokenVerifier::new(SECRET),
            ConnectionSettings::default(),
        );
        (crate::router(state, CorsLayer::permissive()), db)
    }

    fn bearer(user_id: UserId) -> String {
        let token = TokenVerifier::new(SECRET)
            .issue(user_id, chrono::Duration::hours(1))
            .unwrap();
        format!("Bearer {}", token)
    }

    async fn get(app: &Router, uri: &str, auth: Option<String>) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let (app, _db) = app();

        let (status, _) = get(&app, "/api/conversations", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get(&app, "/api/conversations/2", Some("Bearer nope".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get(&app, "/api/conversations", Some("Basic abc".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn conversation_is_ascending_with_both_snapshots() {
        let (app, db) = app();
        let first = db.insert_message(1, 2, Some(5), "Hi").unwrap();
        let second = db.insert_message(2, 1, None, "Hello").unwrap();
        let third = db.insert_message(1, 2, None, "How are you?").unwrap();
        db.insert_message(1, 3, None, "unrelated").unwrap();

        let (status, body) = get(&app, "/api/conversations/1", Some(bearer(2))).await;
        assert_eq!(status, StatusCode::OK);

        let messages = body["messages"].as_array().unwrap();
        let ids: Vec<i64> = messages.iter().map(|m| m["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![first, second, third]);

        assert_eq!(messages[0]["booking_id"], 5);
        assert_eq!(messages[0]["sender"]["user_type"], "creator");
        assert_eq!(messages[0]["receiver"]["email"], "brand@example.com");
        assert_eq!(messages[1]["sender"]["user_type"], "brand");
        assert_eq!(messages[2]["is_read"], false);
    }

    #[tokio::test]
    async fn limit_returns_latest_page_in_ascending_order() {
        let (app, db) = app();
        let ids: Vec<i64> = (0..5)
            .map(|i| db.insert_message(1, 2, None, &format!("m{}", i)).unwrap())
            .collect();

        let (_, body) = get(&app, "/api/conversations/2?limit=2", Some(bearer(1))).await;
        let got: Vec<i64> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_i64().unwrap())
            .collect();
        assert_eq!(got, vec![ids[3], ids[4]]);

        let (_, body) = get(&app, "/api/conversations/2?limit=2&offset=2", Some(bearer(1))).await;
        let got: Vec<i64> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_i64().unwrap())
            .collect();
        assert_eq!(got, vec![ids[1], ids[2]]);
    }

    #[tokio::test]
    async fn bad_path_is_bad_request() {
        let (app, _db) = app();
        let (status, _) = get(&app, "/api/conversations/abc", Some(bearer(1))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_reports_unread_per_partner() {
        let (app, db) = app();
        let a = db.insert_message(2, 1, None, "from brand").unwrap();
        let b = db.insert_message(2, 1, None, "again").unwrap();
        db.insert_message(1, 3, None, "to other").unwrap();

        let (status, body) = get(&app, "/api/conversations", Some(bearer(1))).await;
        assert_eq!(status, StatusCode::OK);

        let list = body["conversations"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["id"], 3);
        assert_eq!(list[0]["last_message"], "to other");
        assert_eq!(list[0]["unread_count"], 0);
        assert_eq!(list[1]["id"], 2);
        assert_eq!(list[1]["email"], "brand@example.com");
        assert_eq!(list[1]["user_type"], "brand");
        assert_eq!(list[1]["last_message"], "again");
        assert_eq!(list[1]["unread_count"], 2);

        db.mark_read(1, &[a, b]).unwrap();
        let (_, body) = get(&app, "/api/conversations", Some(bearer(1))).await;
        assert_eq!(body["conversations"][1]["unread_count"], 0);
    }

    #[tokio::test]
    async fn health_reports_active_users() {
        let (app, _db) = app();
        let (status, body) = get(&app, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "courier");
        assert_eq!(body["activeUsers"], 0);
    }
}
