use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{ConversationSummary, MessagePayload, UserId};

// -- JWT Claims --

/// Session token claims issued by the identity service. Shared between the
/// REST bearer middleware and the gateway's `authenticate` handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The acting user id. Issuers differ on whether this is a JSON number or
    /// a numeric string, so both are accepted.
    #[serde(deserialize_with = "user_id_from_number_or_string")]
    pub sub: UserId,
    pub exp: usize,
}

fn user_id_from_number_or_string<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Sub {
        Number(UserId),
        Text(String),
    }

    match Sub::deserialize(deserializer)? {
        Sub::Number(id) => Ok(id),
        Sub::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// -- Conversations --

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub messages: Vec<MessagePayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<ConversationSummary>,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(rename = "activeUsers")]
    pub active_users: usize,
}
