//! REST side of the Courier relay: conversation history and listing for
//! clients without a live gateway connection, health, and the router that
//! mounts the WebSocket gateway next to them.

pub mod conversations;
pub mod health;
pub mod middleware;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, AppStateInner};
