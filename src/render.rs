// ABOUTME: Plain-text rendering of session store state for the console.
// ABOUTME: Reads only StoreEvent and SessionSnapshot values, never the connection or router.

use chrono::Local;
use serde_json::Value;
use tether_core::connection::ConnectionStatus;
use tether_core::envelope::FileChangeKind;
use tether_core::message::{ChatMessage, MessageKind, Role};
use tether_core::store::{SessionSnapshot, StoreEvent};
use tether_core::task::{AgentTask, StepStatus};
use tether_core::workspace::{FileEvent, FileListing};

/// One console line (or block) for a store change, if it deserves one
pub fn render_event(event: &StoreEvent) -> Option<String> {
    match event {
        StoreEvent::Status(status) => Some(render_status(*status)),
        StoreEvent::Message(message) if message.role == Role::User => None,
        StoreEvent::Message(message) => Some(render_message(message)),
        StoreEvent::Task(task) => Some(render_task(task)),
        StoreEvent::Workspace(event) => Some(render_file_event(event)),
        StoreEvent::ReconnectExhausted { attempts } => Some(format!(
            "!! gave up reconnecting after {} attempts; type /reconnect to try again",
            attempts
        )),
    }
}

pub fn render_status(status: ConnectionStatus) -> String {
    format!("-- {}", status)
}

pub fn render_message(message: &ChatMessage) -> String {
    let time = message.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let who = match message.role {
        Role::User => "you",
        Role::Agent => "agent",
        Role::System => "system",
    };
    let body = match message.kind {
        MessageKind::Text => message.content.clone(),
        MessageKind::Thinking => format!("(thinking) {}", message.content),
        MessageKind::Action => format!("[action] {}", message.content),
        MessageKind::Observation => format!("[observation] {}", message.content),
        MessageKind::Terminal => render_terminal(message),
        MessageKind::Error => format!("error: {}", message.content),
    };
    format!("{} {}> {}", time, who, body)
}

fn render_terminal(message: &ChatMessage) -> String {
    let exit_code = message
        .detail
        .as_ref()
        .and_then(|d| d.get("exit_code"))
        .and_then(Value::as_i64);
    match exit_code {
        Some(code) if code != 0 => format!("[terminal exit {}]\n{}", code, message.content),
        _ => format!("[terminal]\n{}", message.content),
    }
}

fn step_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "[ ]",
        StepStatus::Executing => "[>]",
        StepStatus::Completed => "[x]",
        StepStatus::Failed => "[!]",
    }
}

pub fn render_task(task: &AgentTask) -> String {
    let (done, total) = task.progress();
    let mut out = format!("task {} [{}]", task.id, task.status);
    if total > 0 {
        out.push_str(&format!(" {}/{}", done, total));
    }
    if task.cancelled {
        out.push_str(" (cancelled)");
    }
    if !task.description.is_empty() {
        out.push_str(&format!(": {}", task.description));
    }
    for step in &task.steps {
        out.push_str(&format!("\n  {} {}", step_marker(step.status), step.description));
    }
    if let Some(error) = &task.error {
        out.push_str(&format!("\n  error: {}", error));
    }
    out
}

pub fn render_file_event(event: &FileEvent) -> String {
    match event {
        FileEvent::Changed { kind, path } => {
            let verb = match kind {
                FileChangeKind::Created => "created",
                FileChangeKind::Modified => "modified",
                FileChangeKind::Deleted => "deleted",
            };
            format!("~ {} {}", verb, path)
        }
        FileEvent::Listing(listing) => render_listing(listing),
        FileEvent::Content(file) => format!("== {} ==\n{}", file.path, file.content),
    }
}

pub fn render_listing(listing: &FileListing) -> String {
    let mut out = format!("{}:", listing.base_path);
    if listing.files.is_empty() {
        out.push_str(" (empty)");
    }
    for entry in &listing.files {
        let suffix = if entry.is_dir { "/" } else { "" };
        out.push_str(&format!("\n  {}{}", entry.display_name(), suffix));
    }
    out
}

/// Summary for the /status command
pub fn render_summary(snapshot: &SessionSnapshot) -> String {
    let mut out = format!(
        "session {} is {} ({} messages)",
        snapshot.session_id,
        snapshot.status,
        snapshot.messages.len()
    );
    if snapshot.reconnect_exhausted {
        out.push_str("; automatic reconnect gave up");
    }
    match &snapshot.task {
        Some(task) => {
            let (done, total) = task.progress();
            out.push_str(&format!(
                "\ntask {} is {} ({}/{} steps)",
                task.id, task.status, done, total
            ));
        }
        None => out.push_str("\nno task yet"),
    }
    out
}
