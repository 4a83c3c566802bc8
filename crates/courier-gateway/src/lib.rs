//! Courier realtime gateway.
//!
//! Authenticates WebSocket connections with a signed session token, tracks
//! which users are reachable in this process, stores chat messages and fans
//! them (plus typing, presence and notification signals) out to online peers.

pub mod connection;
pub mod dispatcher;
pub mod presence;
pub mod session;
pub mod token;

pub use dispatcher::{Dispatcher, Flow};
pub use presence::{ConnectionHandle, LocalPresence, PresenceRegistry};
pub use session::{Session, SessionState};
pub use token::{Identity, InvalidToken, TokenVerifier};
