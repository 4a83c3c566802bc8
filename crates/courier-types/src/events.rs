use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageId, MessagePayload, PresenceStatus, UserId};

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Result of an `authenticate` command
    Authenticated {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Sender-side confirmation that a message was stored
    MessageSent(MessagePayload),

    /// A message addressed to this connection's user
    NewMessage(MessagePayload),

    MessagesMarkedRead { message_ids: Vec<MessageId> },

    UserTyping { user_id: UserId, is_typing: bool },

    /// Ephemeral toast relayed from another user; never stored
    NewNotification {
        title: String,
        message: String,
        #[serde(rename = "type")]
        kind: String,
        link: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A user came online or went offline (sent to every connection)
    UserStatus {
        user_id: UserId,
        status: PresenceStatus,
    },

    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Commands sent FROM client TO server over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Bind this connection to the identity in a signed session token
    Authenticate { token: String },

    SendMessage {
        receiver_id: UserId,
        content: String,
        #[serde(default)]
        booking_id: Option<i64>,
    },

    MarkRead {
        #[serde(default)]
        message_ids: Vec<MessageId>,
    },

    Typing { receiver_id: UserId, is_typing: bool },

    SendNotification {
        user_id: UserId,
        title: String,
        message: String,
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        link: Option<String>,
    },
}

impl ClientCommand {
    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::SendMessage { .. } => "send_message",
            Self::MarkRead { .. } => "mark_read",
            Self::Typing { .. } => "typing",
            Self::SendNotification { .. } => "send_notification",
        }
    }
}
