// ABOUTME: Session wires ConnectionManager -> MessageRouter -> SessionStore for one session id.
// ABOUTME: SessionHandle is the Send + Sync front door to a session running on its own task.

use crate::address::ChannelAddress;
use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager};
use crate::envelope::Action;
use crate::error::{SessionError, SessionResult};
use crate::router::{MessageRouter, RouterStats};
use crate::store::{SessionSnapshot, SessionStore, StoreEvent};
use crate::subscribers::SubscriptionId;
use std::sync::Arc;
use tether_transport::Transport;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One operator session. Sole owner of its transport; nothing is global.
///
/// Work happens one event at a time: each `pump` handles a single
/// connection event to completion before the next is looked at.
pub struct Session<T: Transport> {
    connection: ConnectionManager<T>,
    router: MessageRouter,
    store: SessionStore,
    /// Channel-backed store listeners handed out by `subscribe_events`
    feeds: Vec<(SubscriptionId, mpsc::UnboundedSender<StoreEvent>)>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, address: ChannelAddress, config: ConnectionConfig) -> Self {
        let store = SessionStore::new(address.session_id());
        Self {
            connection: ConnectionManager::new(transport, address, config),
            router: MessageRouter::new(),
            store,
            feeds: Vec::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// For registering store listeners
    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn router_stats(&self) -> RouterStats {
        self.router.stats()
    }

    pub async fn connect(&mut self) -> SessionResult<()> {
        let result = self.connection.connect().await;
        self.flush();
        result
    }

    /// Send one operator action.
    ///
    /// `chat` starts a task on the backend, so it is refused while a task
    /// started on this connection is still running. A chat that goes out is
    /// echoed into the transcript as a user message.
    pub async fn send(&mut self, action: Action) -> SessionResult<()> {
        let echo = match &action {
            Action::Chat { content } => {
                if let Err(e) = self.store.ensure_idle() {
                    tracing::warn!(error = %e, "Refusing chat while a task is running");
                    return Err(e);
                }
                Some(content.clone())
            }
            _ => None,
        };

        self.connection.send(action).await?;
        if let Some(content) = echo {
            self.store.push_user_chat(content);
        }
        Ok(())
    }

    /// Stream of store changes from now on. Dropping the receiver removes
    /// its listener the next time the session handles anything.
    pub fn subscribe_events(&mut self) -> StoreEvents {
        self.prune_feeds();
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = tx.clone();
        let id = self.store.subscribe(move |event: &StoreEvent| {
            let _ = sender.send(event.clone());
        });
        self.feeds.push((id, tx));
        StoreEvents::new(rx)
    }

    pub async fn disconnect(&mut self) {
        self.connection.disconnect().await;
        self.flush();
    }

    /// Handle exactly one connection event. Returns false when the connection
    /// has nothing left to deliver (disconnected, exhausted, or never opened).
    pub async fn pump(&mut self) -> bool {
        match self.connection.next_event().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Drive the session until disconnected or every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        enum Next {
            Command(Option<Command>),
            Pumped(bool),
        }

        let mut live = true;
        loop {
            let next = tokio::select! {
                command = commands.recv() => Next::Command(command),
                alive = self.pump(), if live => Next::Pumped(alive),
            };

            match next {
                Next::Command(Some(command)) => {
                    if !self.handle_command(command).await {
                        break;
                    }
                    live = true;
                }
                Next::Command(None) => {
                    tracing::debug!(session_id = %self.store.session_id(), "All handles dropped");
                    break;
                }
                Next::Pumped(alive) => live = alive,
            }
        }

        self.disconnect().await;
        self.feeds.clear();
        self.store.clear_subscribers();
        tracing::info!(
            session_id = %self.store.session_id(),
            stats = ?self.router.stats(),
            "Session worker stopped"
        );
    }

    fn prune_feeds(&mut self) {
        let store = &mut self.store;
        self.feeds.retain(|(id, tx)| {
            if !tx.is_closed() {
                return true;
            }
            store.unsubscribe(*id);
            tracing::debug!(subscription = ?id, "Store event receiver dropped");
            false
        });
    }

    fn flush(&mut self) {
        while let Some(event) = self.connection.poll_queued() {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Status(status) => self.store.set_status(status),
            ConnectionEvent::Frame(raw) => {
                if let Some(classified) = self.router.route(&raw) {
                    self.store.apply(classified);
                }
            }
            ConnectionEvent::Exhausted { attempts } => {
                self.store.mark_reconnect_exhausted(attempts);
            }
        }
        self.prune_feeds();
    }

    /// Returns false when the worker should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { reply } => {
                let _ = reply.send(self.connect().await);
            }
            Command::Send { action, reply } => {
                let _ = reply.send(self.send(action).await);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
            Command::Subscribe { reply } => {
                let _ = reply.send(self.subscribe_events());
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}

/// Commands sent from SessionHandle to the session worker
#[derive(Debug)]
pub enum Command {
    Connect {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Send {
        action: Action,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<StoreEvents>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a spawned session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    session_id: Arc<str>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<Command>, session_id: &str) -> Self {
        Self {
            tx,
            session_id: Arc::from(session_id),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open the channel, or reconnect manually after retries ran out
    pub async fn connect(&self) -> SessionResult<()> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    pub async fn send(&self, action: Action) -> SessionResult<()> {
        self.request(|reply| Command::Send { action, reply }).await?
    }

    pub async fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Stream of store changes from now on
    pub async fn events(&self) -> SessionResult<StoreEvents> {
        self.request(|reply| Command::Subscribe { reply }).await
    }

    /// Close the channel for good and stop the worker
    pub async fn disconnect(&self) -> SessionResult<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> SessionResult<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Receiver for store change notifications.
///
/// This is `Send` so it can be moved to a rendering task.
pub struct StoreEvents {
    rx: mpsc::UnboundedReceiver<StoreEvent>,
}

impl StoreEvents {
    pub fn new(rx: mpsc::UnboundedReceiver<StoreEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or None once the session worker has stopped
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for StoreEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEvents").finish_non_exhaustive()
    }
}

/// Run a session on its own task and return a handle to it
pub fn spawn<T: Transport + 'static>(session: Session<T>) -> (SessionHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let handle = SessionHandle::new(tx, session.store().session_id());
    let worker = tokio::spawn(session.run(rx));
    (handle, worker)
}
