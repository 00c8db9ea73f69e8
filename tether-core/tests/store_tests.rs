// ABOUTME: Tests for SessionStore aggregation, notifications, and snapshots
// ABOUTME: Also checks the thread-safety guarantees of the session handle types

use tether_core::connection::ConnectionStatus;
use tether_core::envelope::FileChangeKind;
use tether_core::message::{ChatDraft, MessageKind, Role};
use tether_core::router::ClassifiedEvent;
use tether_core::session::{SessionHandle, StoreEvents};
use tether_core::store::{SessionSnapshot, SessionStore, StoreEvent};
use tether_core::task::{PlanStep, StepStatus, StepUpdate, TaskEvent, TaskStatus};
use tether_core::workspace::FileEvent;
use std::sync::{Arc, Mutex};

fn assert_send<T: Send>() {}
fn assert_sync<T: Sync>() {}

#[test]
fn test_session_handle_is_send_sync() {
    assert_send::<SessionHandle>();
    assert_sync::<SessionHandle>();
    assert_send::<StoreEvents>();
    assert_send::<SessionStore>();
}

fn started(id: &str) -> ClassifiedEvent {
    ClassifiedEvent::Lifecycle(TaskEvent::Started {
        task_id: id.to_string(),
        description: "refactor".to_string(),
        steps: vec![PlanStep::new("A", "read"), PlanStep::new("B", "write")],
    })
}

#[test]
fn test_messages_keep_arrival_order() {
    let mut store = SessionStore::new("s1");
    for text in ["a", "b", "c"] {
        store.apply(ClassifiedEvent::Message(ChatDraft::new(
            Role::Agent,
            MessageKind::Text,
            text,
        )));
    }
    let contents: Vec<_> = store.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
    let ids: Vec<_> = store.messages().iter().map(|m| m.id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_new_task_replaces_old() {
    let mut store = SessionStore::new("s1");
    store.apply(started("t1"));
    store.apply(ClassifiedEvent::Lifecycle(TaskEvent::Failed {
        task_id: Some("t1".to_string()),
        error: None,
    }));
    assert!(store.ensure_idle().is_ok());

    store.apply(started("t2"));
    assert_eq!(store.task().unwrap().id, "t2");
    assert!(store.ensure_idle().is_err());
}

#[test]
fn test_task_from_earlier_connection_never_blocks() {
    let mut store = SessionStore::new("s1");
    store.set_status(ConnectionStatus::Connected);
    store.apply(started("t1"));
    assert!(store.ensure_idle().is_err());

    // The terminal event for t1 is lost while the channel is down
    store.set_status(ConnectionStatus::Disconnected);
    assert!(store.ensure_idle().is_err());
    store.set_status(ConnectionStatus::Connected);

    assert!(store.ensure_idle().is_ok());
    assert_eq!(store.task().unwrap().status, TaskStatus::Planning);

    store.apply(started("t2"));
    assert!(store.ensure_idle().is_err());
}

#[test]
fn test_ignored_events_do_not_notify() {
    let mut store = SessionStore::new("s1");
    let count = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&count);
    store.subscribe(move |_| *counter.lock().unwrap() += 1);

    // No task yet
    assert!(!store.apply(ClassifiedEvent::Step(StepUpdate {
        task_id: None,
        step_id: "A".to_string(),
        status: StepStatus::Completed,
    })));
    assert!(!store.apply(ClassifiedEvent::Control));
    assert_eq!(*count.lock().unwrap(), 0);

    assert!(store.apply(started("t1")));
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_unsubscribe_stops_events() {
    let mut store = SessionStore::new("s1");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    store.set_status(ConnectionStatus::Connecting);
    assert!(store.unsubscribe(id));
    store.set_status(ConnectionStatus::Connected);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![StoreEvent::Status(ConnectionStatus::Connecting)]
    );
}

#[test]
fn test_repeated_status_is_not_renotified() {
    let mut store = SessionStore::new("s1");
    let count = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&count);
    store.subscribe(move |_| *counter.lock().unwrap() += 1);

    store.set_status(ConnectionStatus::Disconnected);
    store.set_status(ConnectionStatus::Connected);
    store.set_status(ConnectionStatus::Connected);
    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_snapshot_serializes_for_presentation() {
    let mut store = SessionStore::new("s1");
    store.set_status(ConnectionStatus::Connected);
    store.push_user_chat("hello");
    store.apply(started("t1"));
    store.apply(ClassifiedEvent::File(FileEvent::Changed {
        kind: FileChangeKind::Created,
        path: "/workspace/new.rs".to_string(),
    }));

    let snapshot = store.snapshot();
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["session_id"], "s1");
    assert_eq!(json["status"], "connected");
    assert_eq!(json["messages"][0]["role"], "user");
    assert_eq!(json["task"]["status"], "planning");
    assert_eq!(json["task"]["steps"][1]["status"], "pending");
    assert_eq!(json["workspace"]["changes"][0]["kind"], "created");

    let back: SessionSnapshot = serde_json::from_value(json).unwrap();
    assert_eq!(back, snapshot);
}
