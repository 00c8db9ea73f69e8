// ABOUTME: Websocket Transport backed by tokio-tungstenite.
// ABOUTME: Maps tungstenite frames onto TransportEvent; control frames are handled internally.

use crate::traits::{Transport, TransportEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket transport for `ws://` and `wss://` channel addresses
#[derive(Default)]
pub struct WsTransport {
    socket: Option<Socket>,
    /// Set after a read error so the next `recv` reports the close
    close_pending: bool,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a socket is currently held
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn open(&mut self, url: &str) -> Result<()> {
        if self.socket.is_some() {
            tracing::debug!(url = %url, "Replacing existing websocket before reopening");
            self.close().await?;
        }

        let (socket, response) = connect_async(url)
            .await
            .with_context(|| format!("Failed to open websocket to {}", url))?;

        tracing::debug!(
            url = %url,
            status = response.status().as_u16(),
            "Websocket handshake complete"
        );

        self.socket = Some(socket);
        self.close_pending = false;
        Ok(())
    }

    async fn send(&mut self, text: String) -> Result<()> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Websocket is not open"))?;
        socket
            .send(Message::Text(text.into()))
            .await
            .context("Failed to write websocket frame")?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        if self.close_pending {
            self.close_pending = false;
            return Some(TransportEvent::closed("socket error"));
        }

        loop {
            let socket = self.socket.as_mut()?;

            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Binary(data))) => {
                    // The backend only speaks JSON text, but tolerate UTF-8 in binary frames
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Some(TransportEvent::Message(text)),
                        Err(_) => {
                            tracing::warn!(len = data.len(), "Ignoring non-UTF-8 binary frame");
                            continue;
                        }
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    self.socket = None;
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Some(TransportEvent::Closed { code, reason });
                }
                Some(Err(e)) => {
                    self.socket = None;
                    self.close_pending = true;
                    return Some(TransportEvent::Error(e.to_string()));
                }
                None => {
                    self.socket = None;
                    return Some(TransportEvent::closed("stream ended"));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.close_pending = false;
        if let Some(mut socket) = self.socket.take() {
            if let Err(e) = socket.close(None).await {
                // Peer may already be gone; the socket is dropped either way
                tracing::debug!(error = %e, "Websocket close handshake failed");
            }
        }
        Ok(())
    }
}
