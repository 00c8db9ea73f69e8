// ABOUTME: ConnectionManager: owns one Transport, the reconnect policy, and connection status.
// ABOUTME: next_event() is the cooperative step that yields status changes and raw frames in order.

use crate::address::ChannelAddress;
use crate::envelope::Action;
use crate::error::{SessionError, SessionResult};
use crate::reconnect::{BackoffConfig, BackoffState};
use crate::subscribers::{SubscriptionId, Subscribers};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tether_transport::{Transport, TransportEvent};
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// What the manager hands to its driver, one at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Status(ConnectionStatus),
    /// One raw inbound frame, not yet parsed
    Frame(String),
    /// Reconnect budget spent; the channel stays down until a manual connect
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub backoff: BackoffConfig,
    /// Send `ping` at this interval while connected
    pub heartbeat_interval: Option<Duration>,
}

enum Step {
    Transport(Option<TransportEvent>),
    Heartbeat,
}

/// Owns the physical channel for one session.
///
/// Status transitions notify subscribers immediately and are also queued for
/// `next_event`, so a driver sees every transition in order before any later
/// frame. Nothing here looks at message content.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    address: ChannelAddress,
    heartbeat_interval: Option<Duration>,
    status: ConnectionStatus,
    backoff: BackoffState,
    disposed: bool,
    exhausted: bool,
    reconnect_at: Option<Instant>,
    next_heartbeat: Option<Instant>,
    pending: VecDeque<ConnectionEvent>,
    listeners: Subscribers<ConnectionStatus>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, address: ChannelAddress, config: ConnectionConfig) -> Self {
        Self {
            transport,
            address,
            heartbeat_interval: config.heartbeat_interval,
            status: ConnectionStatus::Disconnected,
            backoff: BackoffState::new(config.backoff),
            disposed: false,
            exhausted: false,
            reconnect_at: None,
            next_heartbeat: None,
            pending: VecDeque::new(),
            listeners: Subscribers::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn address(&self) -> &ChannelAddress {
        &self.address
    }

    /// Reconnect attempts since the last successful open
    pub fn attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// True after `disconnect`; the instance cannot reconnect
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Time left until the scheduled reconnect, if one is pending
    pub fn reconnect_in(&self) -> Option<Duration> {
        self.reconnect_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ConnectionStatus) + Send + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Open the channel. No-op while connecting or connected.
    ///
    /// Also serves as the manual reconnect after the budget is exhausted,
    /// which restores the full attempt budget.
    pub async fn connect(&mut self) -> SessionResult<()> {
        if self.disposed {
            tracing::warn!(address = %self.address, "connect() called after disconnect()");
            return Err(SessionError::Disposed);
        }
        if matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            return Ok(());
        }

        if self.exhausted {
            tracing::info!(address = %self.address, "Manual reconnect after exhausted retries");
            self.exhausted = false;
            self.backoff.record_open();
        }

        self.open().await;
        Ok(())
    }

    /// Serialize and write one action. Nothing is queued while the channel is
    /// down; the caller must resend after reconnecting if still wanted.
    pub async fn send(&mut self, action: Action) -> SessionResult<()> {
        if self.disposed {
            tracing::warn!(action = action.tag(), "Dropping send on disposed connection");
            return Err(SessionError::Disposed);
        }
        if self.status != ConnectionStatus::Connected {
            tracing::warn!(
                action = action.tag(),
                status = %self.status,
                "Dropping send while not connected"
            );
            return Err(SessionError::NotConnected {
                action: action.tag().to_string(),
                status: self.status,
            });
        }

        let tag = action.tag();
        let frame = action.into_envelope().to_json();
        self.transport.send(frame).await.map_err(|e| {
            tracing::warn!(action = tag, error = %e, "Transport write failed");
            SessionError::Transport(e.to_string())
        })?;
        tracing::trace!(action = tag, "Sent action");
        Ok(())
    }

    /// Close for good. A new ConnectionManager is needed to reconnect.
    pub async fn disconnect(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.reconnect_at = None;
        self.next_heartbeat = None;
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "Transport close failed during disconnect");
        }
        tracing::info!(address = %self.address, "Disconnected by caller");
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Take an already-queued event without waiting
    pub fn poll_queued(&mut self) -> Option<ConnectionEvent> {
        self.pending.pop_front()
    }

    /// Wait for the next connection event.
    ///
    /// Drives reconnect timers and heartbeats while waiting. Returns `None`
    /// when there is nothing left to wait for: after `disconnect`, once the
    /// reconnect budget is spent, or before the first `connect`.
    /// Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.disposed {
                return None;
            }

            match self.status {
                ConnectionStatus::Connected | ConnectionStatus::Error => {
                    let beat_at = self.next_heartbeat;
                    let step = tokio::select! {
                        event = self.transport.recv() => Step::Transport(event),
                        _ = sleep_until(beat_at.unwrap_or_else(Instant::now)), if beat_at.is_some() => {
                            Step::Heartbeat
                        }
                    };

                    match step {
                        Step::Transport(Some(TransportEvent::Message(text))) => {
                            return Some(ConnectionEvent::Frame(text));
                        }
                        Step::Transport(Some(TransportEvent::Error(error))) => {
                            tracing::warn!(address = %self.address, error = %error, "Transport error");
                            self.set_status(ConnectionStatus::Error);
                        }
                        Step::Transport(Some(TransportEvent::Closed { code, reason })) => {
                            tracing::warn!(
                                address = %self.address,
                                code = ?code,
                                reason = %reason,
                                "Channel closed unexpectedly"
                            );
                            self.handle_unexpected_close();
                        }
                        Step::Transport(None) => {
                            tracing::warn!(address = %self.address, "Transport has no open socket");
                            self.handle_unexpected_close();
                        }
                        Step::Heartbeat => self.beat().await,
                    }
                }
                ConnectionStatus::Connecting | ConnectionStatus::Disconnected => {
                    let deadline = self.reconnect_at?;
                    sleep_until(deadline).await;
                    self.open().await;
                }
            }
        }
    }

    async fn open(&mut self) {
        self.set_status(ConnectionStatus::Connecting);
        let url = self.address.url();
        let result = self.transport.open(&url).await;
        // Cleared only after open returns so a cancelled open is retried
        self.reconnect_at = None;

        match result {
            Ok(()) => {
                let previous_attempts = self.backoff.attempt();
                self.backoff.record_open();
                self.next_heartbeat = self.heartbeat_interval.map(|every| Instant::now() + every);
                tracing::info!(
                    url = %url,
                    transport = self.transport.name(),
                    after_attempts = previous_attempts,
                    "Channel open"
                );
                self.set_status(ConnectionStatus::Connected);
            }
            Err(e) => {
                tracing::warn!(
                    url = %url,
                    attempt = self.backoff.attempt(),
                    error = %e,
                    "Channel open failed"
                );
                self.handle_unexpected_close();
            }
        }
    }

    fn handle_unexpected_close(&mut self) {
        self.next_heartbeat = None;
        self.set_status(ConnectionStatus::Disconnected);

        match self.backoff.next_delay() {
            Some(delay) => {
                tracing::info!(
                    attempt = self.backoff.attempt(),
                    max_attempts = self.backoff.config().max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                let attempts = self.backoff.attempt();
                tracing::error!(
                    address = %self.address,
                    attempts,
                    "Reconnect attempts exhausted; channel stays down"
                );
                self.exhausted = true;
                self.reconnect_at = None;
                self.pending.push_back(ConnectionEvent::Exhausted { attempts });
            }
        }
    }

    async fn beat(&mut self) {
        self.next_heartbeat = self.heartbeat_interval.map(|every| Instant::now() + every);
        if let Err(e) = self.send(Action::Ping).await {
            tracing::debug!(error = %e, "Heartbeat ping not sent");
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        tracing::debug!(from = %self.status, to = %status, "Connection status changed");
        self.status = status;
        self.listeners.notify(&status);
        self.pending.push_back(ConnectionEvent::Status(status));
    }
}
