// ABOUTME: SessionStore: the only state presentation code reads.
// ABOUTME: Aggregates connection status, the chat transcript, the current task, and the workspace view.

use crate::connection::ConnectionStatus;
use crate::error::SessionResult;
use crate::message::{ChatDraft, ChatMessage, MessageKind, Role};
use crate::router::ClassifiedEvent;
use crate::subscribers::{SubscriptionId, Subscribers};
use crate::task::{AgentTask, Applied, StepUpdate, TaskEvent, TaskStateMachine};
use crate::workspace::{FileEvent, WorkspaceView};
use serde::{Deserialize, Serialize};

/// Change notifications delivered to store subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Status(ConnectionStatus),
    Message(ChatMessage),
    /// The current task after a change
    Task(AgentTask),
    Workspace(FileEvent),
    /// Automatic reconnection gave up; the operator must reconnect manually
    ReconnectExhausted { attempts: u32 },
}

/// Serializable point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: ConnectionStatus,
    pub messages: Vec<ChatMessage>,
    pub task: Option<AgentTask>,
    pub workspace: WorkspaceView,
    pub reconnect_exhausted: bool,
}

#[derive(Debug)]
pub struct SessionStore {
    session_id: String,
    status: ConnectionStatus,
    messages: Vec<ChatMessage>,
    next_message_id: u64,
    tasks: TaskStateMachine,
    workspace: WorkspaceView,
    reconnect_exhausted: bool,
    /// Bumped on every successful open
    connection_epoch: u64,
    /// Connection the current task was started on
    task_epoch: Option<u64>,
    listeners: Subscribers<StoreEvent>,
}

impl SessionStore {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: ConnectionStatus::Disconnected,
            messages: Vec::new(),
            next_message_id: 1,
            tasks: TaskStateMachine::new(),
            workspace: WorkspaceView::default(),
            reconnect_exhausted: false,
            connection_epoch: 0,
            task_epoch: None,
            listeners: Subscribers::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Transcript in arrival order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn task(&self) -> Option<&AgentTask> {
        self.tasks.current()
    }

    pub fn workspace(&self) -> &WorkspaceView {
        &self.workspace
    }

    pub fn reconnect_exhausted(&self) -> bool {
        self.reconnect_exhausted
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent) + Send + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Err while a non-terminal task started on the current connection exists.
    /// A task carried over from an earlier connection never blocks, since its
    /// terminal event may have been lost in the gap.
    pub fn ensure_idle(&self) -> SessionResult<()> {
        if self.task_epoch != Some(self.connection_epoch) {
            return Ok(());
        }
        self.tasks.ensure_idle()
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        if status == ConnectionStatus::Connected {
            self.reconnect_exhausted = false;
            self.connection_epoch += 1;
        }
        self.listeners.notify(&StoreEvent::Status(status));
    }

    pub fn mark_reconnect_exhausted(&mut self, attempts: u32) {
        self.reconnect_exhausted = true;
        self.listeners
            .notify(&StoreEvent::ReconnectExhausted { attempts });
    }

    /// Apply one routed event. Returns whether visible state changed.
    pub fn apply(&mut self, event: ClassifiedEvent) -> bool {
        match event {
            ClassifiedEvent::Message(draft) => {
                self.push_message(draft);
                true
            }
            ClassifiedEvent::Lifecycle(event) => self.apply_task_event(event),
            ClassifiedEvent::Step(update) => self.apply_step(update),
            ClassifiedEvent::File(event) => {
                self.workspace.apply(event.clone());
                self.listeners.notify(&StoreEvent::Workspace(event));
                true
            }
            ClassifiedEvent::Control => false,
        }
    }

    /// Append to the transcript, stamping id and arrival time. Returns the id.
    pub fn push_message(&mut self, draft: ChatDraft) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        let message = ChatMessage::from_draft(id, draft);
        self.listeners.notify(&StoreEvent::Message(message.clone()));
        self.messages.push(message);
        id
    }

    /// Record the operator's own chat line
    pub fn push_user_chat(&mut self, content: impl Into<String>) -> u64 {
        self.push_message(ChatDraft::new(Role::User, MessageKind::Text, content))
    }

    pub fn apply_task_event(&mut self, event: TaskEvent) -> bool {
        let applied = self.tasks.apply(event);
        if applied == Applied::Replaced {
            self.task_epoch = Some(self.connection_epoch);
        }
        self.notify_task(applied.changed())
    }

    pub fn apply_step(&mut self, update: StepUpdate) -> bool {
        let applied = self.tasks.apply_step(update);
        self.notify_task(applied.changed())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            status: self.status,
            messages: self.messages.clone(),
            task: self.tasks.current().cloned(),
            workspace: self.workspace.clone(),
            reconnect_exhausted: self.reconnect_exhausted,
        }
    }

    /// Drop all listeners (session teardown)
    pub fn clear_subscribers(&mut self) {
        self.listeners.clear();
    }

    fn notify_task(&mut self, changed: bool) -> bool {
        if changed {
            if let Some(task) = self.tasks.current() {
                self.listeners.notify(&StoreEvent::Task(task.clone()));
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_increase() {
        let mut store = SessionStore::new("s1");
        let a = store.push_user_chat("one");
        let b = store.push_user_chat("two");
        assert!(b > a);
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn test_connected_clears_exhausted_flag() {
        let mut store = SessionStore::new("s1");
        store.mark_reconnect_exhausted(5);
        assert!(store.reconnect_exhausted());
        store.set_status(ConnectionStatus::Connected);
        assert!(!store.reconnect_exhausted());
    }

    #[test]
    fn test_control_changes_nothing() {
        let mut store = SessionStore::new("s1");
        assert!(!store.apply(ClassifiedEvent::Control));
        assert!(store.messages().is_empty());
    }
}
