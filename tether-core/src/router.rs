// ABOUTME: MessageRouter: parses raw frames and classifies envelopes by their type tag.
// ABOUTME: Fail-open: unknown or undecodable envelopes become raw-text system messages.

use crate::envelope::{Envelope, InboundTag};
use crate::message::{ChatDraft, MessageKind, Role};
use crate::task::{PlanStep, StepStatus, StepUpdate, TaskEvent, TaskStatus};
use crate::workspace::{FileEvent, FileListing, OpenFile};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where one envelope goes. Exactly one per envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    /// Append to the transcript
    Message(ChatDraft),
    /// Feed the task state machine
    Lifecycle(TaskEvent),
    Step(StepUpdate),
    /// Update the workspace view
    File(FileEvent),
    /// Consumed silently (pong, ack)
    Control,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Envelopes classified by their tag
    pub routed: u64,
    /// Envelopes surfaced as raw text
    pub passthrough: u64,
    /// Frames that were not envelopes at all
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct MessageRouter {
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Parse and classify one raw frame. Malformed frames are logged and
    /// dropped so they never reach the task state or the transcript.
    pub fn route(&mut self, raw: &str) -> Option<ClassifiedEvent> {
        match Envelope::parse(raw) {
            Ok(envelope) => Some(self.classify(&envelope)),
            Err(e) => {
                self.stats.dropped += 1;
                tracing::warn!(error = %e, bytes = raw.len(), "Dropping malformed frame");
                None
            }
        }
    }

    /// Total over every envelope: an unrecognized tag, or a recognized tag
    /// whose payload can't be decoded, yields a passthrough message.
    pub fn classify(&mut self, envelope: &Envelope) -> ClassifiedEvent {
        let tag = InboundTag::from_tag(&envelope.kind);
        if let Some(event) = decode(tag, envelope) {
            self.stats.routed += 1;
            return event;
        }

        self.stats.passthrough += 1;
        if tag == InboundTag::Unknown {
            tracing::debug!(tag = %envelope.kind, "Passing through unrecognized envelope");
        } else {
            tracing::warn!(tag = %envelope.kind, "Undecodable payload for known tag, passing through");
        }
        ClassifiedEvent::Message(ChatDraft::new(
            Role::System,
            MessageKind::Text,
            envelope.to_json(),
        ))
    }
}

fn decode(tag: InboundTag, envelope: &Envelope) -> Option<ClassifiedEvent> {
    let data = &envelope.data;
    let event = match tag {
        InboundTag::TaskStarted => ClassifiedEvent::Lifecycle(TaskEvent::Started {
            task_id: task_id(data).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            description: task_description(data),
            steps: plan_steps(data)?,
        }),
        InboundTag::PlanReady => ClassifiedEvent::Lifecycle(TaskEvent::PlanReady {
            task_id: task_id(data),
            steps: plan_steps(data)?,
        }),
        InboundTag::TaskCompleted => ClassifiedEvent::Lifecycle(TaskEvent::Completed {
            task_id: task_id(data),
            output: task_text(
                data,
                &["output", "final_output", "result", "message", "content"],
            ),
            reported: reported_status(data),
        }),
        InboundTag::TaskFailed => ClassifiedEvent::Lifecycle(TaskEvent::Failed {
            task_id: task_id(data),
            error: task_text(data, &["error", "message", "reason"]),
        }),
        InboundTag::TaskStopped => ClassifiedEvent::Lifecycle(TaskEvent::StopAcknowledged {
            task_id: task_id(data),
        }),
        InboundTag::PlanStepUpdated => {
            let step = data.get("step").and_then(Value::as_object);
            let status = first_str(data, &["status"])
                .or_else(|| step.and_then(|s| first_str(s, &["status"])))
                .and_then(StepStatus::from_wire)?;
            ClassifiedEvent::Step(StepUpdate {
                task_id: task_id(data),
                step_id: step_id(data)?,
                status,
            })
        }
        InboundTag::StepStarted | InboundTag::StepCompleted => {
            let status = if tag == InboundTag::StepStarted {
                StepStatus::Executing
            } else {
                StepStatus::Completed
            };
            ClassifiedEvent::Step(StepUpdate {
                task_id: task_id(data),
                step_id: step_id(data)?,
                status,
            })
        }
        InboundTag::Content => ClassifiedEvent::Message(content_message(&envelope.kind, data)),
        InboundTag::FileChanged(kind) => ClassifiedEvent::File(FileEvent::Changed {
            kind,
            path: first_str(data, &["path", "file_path"])?.to_string(),
        }),
        InboundTag::FilesList => {
            let listing: FileListing = serde_json::from_value(Value::Object(data.clone())).ok()?;
            ClassifiedEvent::File(FileEvent::Listing(listing))
        }
        InboundTag::FileContent => {
            let file: OpenFile = serde_json::from_value(Value::Object(data.clone())).ok()?;
            ClassifiedEvent::File(FileEvent::Content(file))
        }
        InboundTag::Notice => {
            if envelope.kind == "status" && data.get("pong").and_then(Value::as_bool) == Some(true)
            {
                return Some(ClassifiedEvent::Control);
            }
            ClassifiedEvent::Message(notice_message(&envelope.kind, data))
        }
        InboundTag::Control => ClassifiedEvent::Control,
        InboundTag::Unknown => return None,
    };
    Some(event)
}

fn content_message(tag: &str, data: &Map<String, Value>) -> ChatDraft {
    let kind = MessageKind::from_tag(tag).unwrap_or_default();
    // Bare `error` comes from the backend itself, `agent_error` from the agent
    let role = if tag == "error" { Role::System } else { Role::Agent };

    let text = first_str(data, &["content", "message", "text", "output", "thought", "error"])
        .map(str::to_string)
        .or_else(|| (kind == MessageKind::Action).then(|| describe_action(data)).flatten())
        .unwrap_or_else(|| raw_data(data));

    let draft = ChatDraft::new(role, kind, text);
    match kind {
        MessageKind::Terminal | MessageKind::Action | MessageKind::Error if !data.is_empty() => {
            let mut detail = data.clone();
            if tag == "terminal_error" {
                detail.insert("stream".to_string(), Value::String("stderr".to_string()));
            }
            draft.with_detail(Value::Object(detail))
        }
        _ => draft,
    }
}

fn notice_message(tag: &str, data: &Map<String, Value>) -> ChatDraft {
    let text = first_str(data, &["message", "content", "status"])
        .map(str::to_string)
        .or_else(|| first_str(data, &["agent_state"]).map(|s| format!("agent {}", s)))
        .unwrap_or_else(|| tag.replace('_', " "));
    let draft = ChatDraft::new(Role::System, MessageKind::Text, text);
    if data.is_empty() {
        draft
    } else {
        draft.with_detail(Value::Object(data.clone()))
    }
}

fn describe_action(data: &Map<String, Value>) -> Option<String> {
    if let Some(command) = first_str(data, &["command"]) {
        return Some(format!("$ {}", command));
    }
    let path = first_str(data, &["path"])?;
    let verb = first_str(data, &["action", "action_type"]).unwrap_or("file");
    Some(format!("{} {}", verb, path))
}

/// The nested `{"task": {...}}` object, when the backend sends one
fn nested_task(data: &Map<String, Value>) -> Option<&Map<String, Value>> {
    data.get("task").and_then(Value::as_object)
}

fn task_id(data: &Map<String, Value>) -> Option<String> {
    data.get("task_id")
        .and_then(id_string)
        .or_else(|| nested_task(data).and_then(|t| t.get("id")).and_then(id_string))
}

fn step_id(data: &Map<String, Value>) -> Option<String> {
    data.get("step_id")
        .and_then(id_string)
        .or_else(|| {
            data.get("step")
                .and_then(Value::as_object)
                .and_then(|s| s.get("id"))
                .and_then(id_string)
        })
        .or_else(|| data.get("id").and_then(id_string))
}

fn reported_status(data: &Map<String, Value>) -> Option<TaskStatus> {
    nested_task(data)
        .and_then(|t| first_str(t, &["status"]))
        .and_then(TaskStatus::from_wire)
}

fn task_description(data: &Map<String, Value>) -> String {
    nested_task(data)
        .and_then(|t| first_str(t, &["description", "title"]))
        .or_else(|| first_str(data, &["description", "task", "message", "content"]))
        .unwrap_or_default()
        .to_string()
}

fn task_text(data: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    first_str(data, keys)
        .or_else(|| nested_task(data).and_then(|t| first_str(t, keys)))
        .map(str::to_string)
}

/// Step list from `steps`, `plan`, or the nested task. Absent means empty;
/// present but not a list means the payload is undecodable.
fn plan_steps(data: &Map<String, Value>) -> Option<Vec<PlanStep>> {
    let raw = data
        .get("steps")
        .or_else(|| data.get("plan"))
        .or_else(|| nested_task(data).and_then(|t| t.get("plan").or_else(|| t.get("steps"))));

    match raw {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, item)| plan_step(index, item))
            .collect(),
        Some(_) => None,
    }
}

fn plan_step(index: usize, item: &Value) -> Option<PlanStep> {
    let fallback_id = || format!("step-{}", index + 1);
    match item {
        Value::String(description) => Some(PlanStep::new(fallback_id(), description.as_str())),
        Value::Object(obj) => Some(PlanStep {
            id: obj.get("id").and_then(id_string).unwrap_or_else(fallback_id),
            description: first_str(obj, &["description", "title", "content"])
                .unwrap_or_default()
                .to_string(),
            status: first_str(obj, &["status"])
                .and_then(StepStatus::from_wire)
                .unwrap_or(StepStatus::Pending),
        }),
        _ => None,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_str<'a>(data: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| data.get(*key).and_then(Value::as_str))
}

fn raw_data(data: &Map<String, Value>) -> String {
    if data.is_empty() {
        String::new()
    } else {
        Value::Object(data.clone()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_numeric_ids_are_stringified() {
        let mut router = MessageRouter::new();
        let event = router.classify(&envelope(json!({
            "type": "plan_step_updated",
            "data": {"step_id": 2, "status": "completed"}
        })));
        assert_eq!(
            event,
            ClassifiedEvent::Step(StepUpdate {
                task_id: None,
                step_id: "2".to_string(),
                status: StepStatus::Completed,
            })
        );
    }

    #[test]
    fn test_string_plan_entries_get_positional_ids() {
        let steps = plan_steps(
            json!({"steps": ["read code", "write fix"]})
                .as_object()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(steps[0].id, "step-1");
        assert_eq!(steps[1].description, "write fix");
    }

    #[test]
    fn test_non_list_plan_is_undecodable() {
        assert!(plan_steps(json!({"steps": "soon"}).as_object().unwrap()).is_none());
    }
}
