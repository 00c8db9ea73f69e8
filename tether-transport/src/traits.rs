// ABOUTME: Core Transport trait that every socket implementation provides.
// ABOUTME: Knows only open/send/close/receive-raw-text; no reconnection or parsing.

use anyhow::Result;
use async_trait::async_trait;

/// Something the socket reported after it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One raw inbound text frame, unparsed
    Message(String),
    /// The socket hit an error; a `Closed` event follows
    Error(String),
    /// The socket closed, for whatever reason
    Closed {
        /// Close code if the peer sent one
        code: Option<u16>,
        /// Close reason text (may be empty)
        reason: String,
    },
}

impl TransportEvent {
    /// Convenience constructor for a close without a peer close frame
    pub fn closed(reason: impl Into<String>) -> Self {
        TransportEvent::Closed {
            code: None,
            reason: reason.into(),
        }
    }
}

/// A single physical socket.
///
/// Implementations own at most one live connection. `recv` must be
/// cancel-safe: the connection manager races it against timers inside
/// `tokio::select!`, so dropping a pending `recv` future must not lose a frame.
#[async_trait]
pub trait Transport: Send {
    /// Transport name for logging
    fn name(&self) -> &'static str;

    /// Open the socket to `url`. An error means the socket never opened.
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Write one text frame to the open socket
    async fn send(&mut self, text: String) -> Result<()>;

    /// Wait for the next socket event, or `None` if no socket is open
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Close the socket if one is open. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}
