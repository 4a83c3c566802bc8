//! Wire types shared by the Courier relay crates.
//!
//! Nothing in here touches the database or the network: these are the shapes
//! that cross the WebSocket gateway and the REST query endpoints.

pub mod api;
pub mod events;
pub mod models;
