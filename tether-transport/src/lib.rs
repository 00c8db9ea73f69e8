// ABOUTME: Socket transport abstraction for tether realtime sessions.
// ABOUTME: Provides the Transport trait, a websocket implementation, and a scripted test double.

pub mod traits;
pub mod websocket;

pub mod testing;

pub use traits::{Transport, TransportEvent};
pub use websocket::WsTransport;
