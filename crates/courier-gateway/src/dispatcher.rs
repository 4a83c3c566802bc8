use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use courier_db::Database;
use courier_types::events::{ClientCommand, ServerEvent};
use courier_types::models::{MessageId, MessagePayload, PresenceStatus, UserId};

use crate::presence::{ConnectionHandle, LocalPresence, PresenceRegistry};
use crate::session::{Session, SessionError};
use crate::token::TokenVerifier;

/// Longest accepted message body, in characters.
pub const MAX_CONTENT_CHARS: usize = 5000;

const SERVER_ERROR: &str = "Server error";
const NOT_AUTHENTICATED: &str = "Not authenticated";

/// What the connection loop should do after a command was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("Message content cannot be empty")]
    Empty,
    #[error("Message content exceeds {max} characters")]
    TooLong { max: usize },
}

pub fn validate_content(content: &str) -> Result<(), ContentError> {
    if content.trim().is_empty() {
        return Err(ContentError::Empty);
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ContentError::TooLong {
            max: MAX_CONTENT_CHARS,
        });
    }
    Ok(())
}

/// Owns presence for this process, handles every inbound gateway command and
/// fans the resulting events out.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    db: Arc<Database>,
    verifier: TokenVerifier,
    presence: Arc<dyn PresenceRegistry>,

    /// Events every open connection receives (presence changes)
    broadcast_tx: broadcast::Sender<ServerEvent>,

    /// Held while a presence change is applied and published, so a new
    /// session's snapshot is always queued before any later status event.
    presence_order: Mutex<()>,
}

impl Dispatcher {
    pub fn new(db: Arc<Database>, verifier: TokenVerifier) -> Self {
        Self::with_presence(db, verifier, Arc::new(LocalPresence::new()))
    }

    /// Build a dispatcher over a caller-supplied registry, e.g. one backed by
    /// a shared broker instead of process memory.
    pub fn with_presence(
        db: Arc<Database>,
        verifier: TokenVerifier,
        presence: Arc<dyn PresenceRegistry>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                db,
                verifier,
                presence,
                broadcast_tx,
                presence_order: Mutex::new(()),
            }),
        }
    }

    /// Subscribe to events sent to all connections.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Number of users currently registered as reachable.
    pub fn active_users(&self) -> usize {
        self.inner.presence.len()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.inner.presence.lookup(user_id).is_some()
    }

    /// Create the session for a freshly accepted connection. The receiver is
    /// the connection's outbound queue.
    pub fn open_session(&self) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(ConnectionHandle::new(tx)), rx)
    }

    pub async fn handle_command(&self, session: &mut Session, cmd: ClientCommand) -> Flow {
        match cmd {
            ClientCommand::Authenticate { token } => return self.authenticate(session, &token),

            ClientCommand::SendMessage {
                receiver_id,
                content,
                booking_id,
            } => {
                self.handle_send(session, receiver_id, content, booking_id)
                    .await
            }

            ClientCommand::MarkRead { message_ids } => {
                self.handle_mark_read(session, message_ids).await
            }

            ClientCommand::Typing {
                receiver_id,
                is_typing,
            } => self.handle_typing(session, receiver_id, is_typing),

            ClientCommand::SendNotification {
                user_id,
                title,
                message,
                kind,
                link,
            } => self.handle_send_notification(session, user_id, title, message, kind, link),
        }

        Flow::Continue
    }

    /// Verify `token` and bind the session to its user. A bad token is fatal
    /// for the connection: the caller must close it on `Flow::Close`.
    pub fn authenticate(&self, session: &mut Session, token: &str) -> Flow {
        if session.is_authenticated() {
            session.emit(ServerEvent::error("Already authenticated"));
            return Flow::Continue;
        }

        let identity = match self.inner.verifier.verify(token) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Connection {} failed to authenticate: {}", session.socket_id(), e);
                session.emit(ServerEvent::Authenticated {
                    success: false,
                    user_id: None,
                    error: Some("Invalid token".into()),
                });
                return Flow::Close;
            }
        };

        let user_id = identity.user_id;
        if let Err(e) = session.bind(user_id) {
            warn!("Connection {} cannot authenticate: {}", session.socket_id(), e);
            return match e {
                SessionError::Closed => Flow::Close,
                SessionError::AlreadyAuthenticated => Flow::Continue,
            };
        }

        let _order = self.presence_order();
        self.inner.presence.register(user_id, session.handle().clone());
        info!("User {} authenticated on {}", user_id, session.socket_id());

        session.emit(ServerEvent::Authenticated {
            success: true,
            user_id: Some(user_id),
            error: None,
        });

        // Tell the new connection who is already here
        for uid in self.inner.presence.online_users() {
            if uid != user_id {
                session.emit(ServerEvent::UserStatus {
                    user_id: uid,
                    status: PresenceStatus::Online,
                });
            }
        }

        self.broadcast(ServerEvent::UserStatus {
            user_id,
            status: PresenceStatus::Online,
        });

        Flow::Continue
    }

    /// Store a message, confirm it to the sender and deliver it live to the
    /// receiver when they are online.
    pub async fn handle_send(
        &self,
        session: &Session,
        receiver_id: UserId,
        content: String,
        booking_id: Option<i64>,
    ) {
        let Some(sender_id) = require_auth(session) else {
            return;
        };

        if let Err(e) = validate_content(&content) {
            warn!("User {} sent rejected content: {}", sender_id, e);
            session.emit(ServerEvent::error(e.to_string()));
            return;
        }

        let stored = self
            .blocking(move |db| {
                if db.get_user(receiver_id)?.is_none() {
                    return Err(anyhow!("receiver {} does not exist", receiver_id));
                }
                let id = db.insert_message(sender_id, receiver_id, booking_id, &content)?;
                db.get_message(id)?
                    .ok_or_else(|| anyhow!("message {} missing after insert", id))
            })
            .await;

        let message: MessagePayload = match stored {
            Ok(row) => row.into(),
            Err(e) => {
                error!("Failed to store message from {} to {}: {}", sender_id, receiver_id, e);
                session.emit(ServerEvent::error(SERVER_ERROR));
                return;
            }
        };

        debug!("Message {} stored ({} -> {})", message.id, sender_id, receiver_id);
        session.emit(ServerEvent::MessageSent(message.clone()));

        match self.inner.presence.lookup(receiver_id) {
            Some(peer) => {
                peer.send(ServerEvent::NewMessage(message));
            }
            None => debug!("User {} offline, message {} kept for later fetch", receiver_id, message.id),
        }
    }

    /// Mark messages addressed to the caller as read.
    pub async fn handle_mark_read(&self, session: &Session, message_ids: Vec<MessageId>) {
        let Some(user_id) = require_auth(session) else {
            return;
        };

        if message_ids.is_empty() {
            return;
        }

        let ids = message_ids.clone();
        match self.blocking(move |db| db.mark_read(user_id, &ids)).await {
            Ok(changed) => {
                debug!("User {} marked {} of {} messages read", user_id, changed, message_ids.len());
                session.emit(ServerEvent::MessagesMarkedRead { message_ids });
            }
            Err(e) => {
                error!("Failed to mark messages read for {}: {}", user_id, e);
                session.emit(ServerEvent::error(SERVER_ERROR));
            }
        }
    }

    pub fn handle_typing(&self, session: &Session, receiver_id: UserId, is_typing: bool) {
        let Some(user_id) = require_auth(session) else {
            return;
        };

        if let Some(peer) = self.inner.presence.lookup(receiver_id) {
            peer.send(ServerEvent::UserTyping { user_id, is_typing });
        }
    }

    /// Relay an ephemeral notification. Lost if the target is offline.
    pub fn handle_send_notification(
        &self,
        session: &Session,
        target_user_id: UserId,
        title: String,
        message: String,
        kind: String,
        link: Option<String>,
    ) {
        let Some(user_id) = require_auth(session) else {
            return;
        };

        match self.inner.presence.lookup(target_user_id) {
            Some(peer) => {
                debug!("User {} -> notification to {}", user_id, target_user_id);
                peer.send(ServerEvent::NewNotification {
                    title,
                    message,
                    kind,
                    link,
                    timestamp: chrono::Utc::now(),
                });
            }
            None => debug!("Notification to offline user {} dropped", target_user_id),
        }
    }

    /// Transport closed. Only the connection that still owns the presence
    /// entry takes the user offline.
    pub fn disconnect(&self, session: &mut Session) {
        let Some(user_id) = session.close() else {
            debug!("Unauthenticated connection {} closed", session.socket_id());
            return;
        };

        let _order = self.presence_order();
        if !self.inner.presence.unregister(user_id, session.socket_id()) {
            // A newer connection has taken over; the user is still online
            info!("User {} closed stale connection {}", user_id, session.socket_id());
            return;
        }

        info!("User {} disconnected from {}", user_id, session.socket_id());
        self.broadcast(ServerEvent::UserStatus {
            user_id,
            status: PresenceStatus::Offline,
        });
    }

    fn presence_order(&self) -> MutexGuard<'_, ()> {
        self.inner
            .presence_order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a store call off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.inner.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    }
}

/// The bound user, or `None` after answering with an error acknowledgement.
fn require_auth(session: &Session) -> Option<UserId> {
    match session.user_id() {
        Some(user_id) if session.is_authenticated() => Some(user_id),
        _ => {
            session.emit(ServerEvent::error(NOT_AUTHENTICATED));
            None
        }
    }
}
