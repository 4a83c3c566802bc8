use crate::Database;
use crate::models::{ConversationRow, MessageRow, UserRow};
use anyhow::Result;
use courier_types::models::UserType;
use rusqlite::{Connection, Row};

/// Columns shared by every message read: the message itself plus the
/// sender's and receiver's user rows (LEFT JOINed, so possibly NULL).
const MESSAGE_SELECT: &str = "
    SELECT m.id, m.sender_id, m.receiver_id, m.booking_id, m.content, m.is_read, m.created_at,
           s.email, s.user_type, r.email, r.user_type
    FROM messages m
    LEFT JOIN users s ON s.id = m.sender_id
    LEFT JOIN users r ON r.id = m.receiver_id";

/// Ids bound per `UPDATE` in `mark_read`.
const MARK_READ_CHUNK: usize = 500;

impl Database {
    // -- Users --

    /// Insert or replace a user row. The relay never creates users in
    /// production; this exists for fixtures and local development.
    pub fn seed_user(&self, id: i64, email: &str, user_type: UserType) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO users (id, email, user_type) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, email, user_type.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, user_type FROM users WHERE id = ?1",
                [id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        user_type: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Messages --

    /// Insert a new unread message. `id` and `created_at` are assigned by the
    /// store; returns the new id.
    pub fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        booking_id: Option<i64>,
        content: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, booking_id, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![sender_id, receiver_id, booking_id, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch one message with the sender snapshot attached.
    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE m.id = ?1", MESSAGE_SELECT);
            conn.query_row(&sql, [id], |row| message_from_row(row, false))
                .optional()
        })
    }

    /// Flag the given messages as read, but only those addressed to
    /// `receiver_id`. Ids belonging to other receivers are silently skipped.
    /// Returns the number of rows that changed.
    ///
    /// Ids are bound in chunks of `MARK_READ_CHUNK` inside one transaction,
    /// so batches of any size stay under SQLite's bound-variable limit.
    pub fn mark_read(&self, receiver_id: i64, message_ids: &[i64]) -> Result<usize> {
        let mut ids = message_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut changed = 0;
            for chunk in ids.chunks(MARK_READ_CHUNK) {
                let placeholders: Vec<String> =
                    (2..=chunk.len() + 1).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "UPDATE messages SET is_read = 1 WHERE receiver_id = ?1 AND is_read = 0 AND id IN ({})",
                    placeholders.join(", ")
                );

                let params = std::iter::once(receiver_id).chain(chunk.iter().copied());
                changed += tx.execute(&sql, rusqlite::params_from_iter(params))?;
            }
            tx.commit()?;
            Ok(changed)
        })
    }

    /// Messages exchanged between two users, newest first. Callers that want
    /// chronological order reverse the page.
    pub fn get_conversation(
        &self,
        user_id: i64,
        other_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, user_id, other_id, limit, offset))
    }

    /// One row per conversation partner of `user_id`, most recent first.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| query_conversation_list(conn, user_id))
    }
}

fn message_from_row(row: &Row<'_>, with_receiver: bool) -> rusqlite::Result<MessageRow> {
    let receiver = if with_receiver {
        Some((row.get(9)?, row.get(10)?))
    } else {
        None
    };

    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        booking_id: row.get(3)?,
        content: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
        sender_email: row.get(7)?,
        sender_type: row.get(8)?,
        receiver,
    })
}

fn query_conversation(
    conn: &Connection,
    user_id: i64,
    other_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "{}
         WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
            OR (m.sender_id = ?2 AND m.receiver_id = ?1)
         ORDER BY m.created_at DESC, m.id DESC
         LIMIT ?3 OFFSET ?4",
        MESSAGE_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(rusqlite::params![user_id, other_id, limit, offset], |row| {
            message_from_row(row, true)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_conversation_list(conn: &Connection, user_id: i64) -> Result<Vec<ConversationRow>> {
    // Last message and unread count are computed per (caller, partner) pair.
    let mut stmt = conn.prepare(
        "WITH partners AS (
             SELECT DISTINCT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END AS partner_id
             FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1
         ),
         latest AS (
             SELECT p.partner_id,
                    (SELECT m.id FROM messages m
                     WHERE (m.sender_id = ?1 AND m.receiver_id = p.partner_id)
                        OR (m.sender_id = p.partner_id AND m.receiver_id = ?1)
                     ORDER BY m.created_at DESC, m.id DESC
                     LIMIT 1) AS last_id
             FROM partners p
         )
         SELECT l.partner_id, u.email, u.user_type, m.content, m.created_at,
                (SELECT COUNT(*) FROM messages x
                 WHERE x.sender_id = l.partner_id AND x.receiver_id = ?1 AND x.is_read = 0) AS unread_count
         FROM latest l
         JOIN messages m ON m.id = l.last_id
         LEFT JOIN users u ON u.id = l.partner_id
         ORDER BY m.created_at DESC, m.id DESC",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(ConversationRow {
                partner_id: row.get(0)?,
                email: row.get(1)?,
                user_type: row.get(2)?,
                last_message: row.get(3)?,
                last_message_time: row.get(4)?,
                unread_count: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
