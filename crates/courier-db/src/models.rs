//! Database row types — these map directly to SQLite rows.
//! Distinct from courier-types wire models to keep the DB layer independent;
//! the `From` impls below do the conversion.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use courier_types::models::{ConversationSummary, MessagePayload, UserSummary, UserType};

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub user_type: String,
}

/// A message joined with the sender's (and optionally receiver's) user row.
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub booking_id: Option<i64>,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
    pub sender_email: Option<String>,
    pub sender_type: Option<String>,
    pub receiver: Option<(Option<String>, Option<String>)>,
}

pub struct ConversationRow {
    pub partner_id: i64,
    pub email: Option<String>,
    pub user_type: Option<String>,
    pub last_message: String,
    pub last_message_time: String,
    pub unread_count: i64,
}

/// Parse a stored timestamp. Rows written by this crate are RFC 3339; rows
/// written by `datetime('now')` elsewhere come without a timezone.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

fn parse_user_type(raw: Option<String>) -> Option<UserType> {
    let raw = raw?;
    raw.parse()
        .map_err(|e| warn!("Corrupt user_type: {}", e))
        .ok()
}

fn summary(email: Option<String>, user_type: Option<String>) -> UserSummary {
    UserSummary {
        email,
        user_type: parse_user_type(user_type),
    }
}

impl From<MessageRow> for MessagePayload {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            booking_id: row.booking_id,
            content: row.content,
            is_read: row.is_read,
            created_at: parse_timestamp(&row.created_at),
            sender: summary(row.sender_email, row.sender_type),
            receiver: row.receiver.map(|(email, user_type)| summary(email, user_type)),
        }
    }
}

impl From<ConversationRow> for ConversationSummary {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.partner_id,
            email: row.email,
            user_type: parse_user_type(row.user_type),
            last_message: row.last_message,
            last_message_time: parse_timestamp(&row.last_message_time),
            unread_count: u32::try_from(row.unread_count).unwrap_or(u32::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_millisecond_rfc3339() {
        let ts = parse_timestamp("2026-03-01T10:20:30.456Z");
        assert_eq!(ts.year(), 2026);
        assert_eq!(ts.second(), 30);
        assert_eq!(ts.timestamp_subsec_millis(), 456);
    }

    #[test]
    fn parses_sqlite_datetime_as_utc() {
        let ts = parse_timestamp("2026-03-01 10:20:30");
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn unknown_user_type_becomes_none() {
        assert_eq!(parse_user_type(Some("agency".into())), None);
        assert_eq!(parse_user_type(Some("brand".into())), Some(UserType::Brand));
    }
}
