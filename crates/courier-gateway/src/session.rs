use thiserror::Error;
use uuid::Uuid;

use courier_types::events::ServerEvent;
use courier_types::models::UserId;

use crate::presence::ConnectionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is already authenticated")]
    AlreadyAuthenticated,
    #[error("session is closed")]
    Closed,
}

/// Per-connection state: unauthenticated → authenticated → closed.
///
/// A session binds at most one user for its whole lifetime; a new identity
/// needs a new connection.
#[derive(Debug)]
pub struct Session {
    handle: ConnectionHandle,
    user_id: Option<UserId>,
    state: SessionState,
}

impl Session {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            user_id: None,
            state: SessionState::Unauthenticated,
        }
    }

    /// Opaque transport id of this connection.
    pub fn socket_id(&self) -> Uuid {
        self.handle.conn_id()
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Queue an event on this session's own connection.
    pub fn emit(&self, event: ServerEvent) {
        self.handle.send(event);
    }

    pub(crate) fn bind(&mut self, user_id: UserId) -> Result<(), SessionError> {
        match self.state {
            SessionState::Unauthenticated => {
                self.user_id = Some(user_id);
                self.state = SessionState::Authenticated;
                Ok(())
            }
            SessionState::Authenticated => Err(SessionError::AlreadyAuthenticated),
            SessionState::Closed => Err(SessionError::Closed),
        }
    }

    /// Move to Closed. Returns the bound user if the session was
    /// authenticated, `None` if it never was or was already closed.
    pub(crate) fn close(&mut self) -> Option<UserId> {
        let was = std::mem::replace(&mut self.state, SessionState::Closed);
        match was {
            SessionState::Authenticated => self.user_id,
            _ => None,
        }
    }
}
