// ABOUTME: Wire unit for the session channel: the tagged {type, data} envelope.
// ABOUTME: Also defines outbound operator actions and the inbound tag vocabulary.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// The `{ "type": ..., "data": {...} }` record exchanged in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

#[derive(Debug, Error)]
#[error("malformed envelope: {0}")]
pub struct EnvelopeError(#[from] serde_json::Error);

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Parse one raw frame. Fails for non-JSON, non-object frames, a missing or
    /// non-string `type`, and non-object `data`.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize for the wire
    pub fn to_json(&self) -> String {
        // Map<String, Value> always serializes
        serde_json::to_string(self).unwrap_or_default()
    }

    /// String field from `data`, if present
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// An outbound operator intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Chat { content: String },
    Terminal { command: String },
    ListFiles { path: String },
    ReadFile { path: String },
    Stop,
    Ping,
}

impl Action {
    /// Wire tag for this action
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Chat { .. } => "chat",
            Action::Terminal { .. } => "terminal",
            Action::ListFiles { .. } => "list_files",
            Action::ReadFile { .. } => "read_file",
            Action::Stop => "stop",
            Action::Ping => "ping",
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let tag = self.tag();
        let mut data = Map::new();
        match self {
            Action::Chat { content } => {
                data.insert("content".to_string(), Value::String(content));
            }
            Action::Terminal { command } => {
                data.insert("command".to_string(), Value::String(command));
            }
            Action::ListFiles { path } | Action::ReadFile { path } => {
                data.insert("path".to_string(), Value::String(path));
            }
            Action::Stop | Action::Ping => {}
        }
        Envelope::new(tag, data)
    }
}

/// File change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// What an inbound `type` tag means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTag {
    TaskStarted,
    PlanReady,
    TaskCompleted,
    TaskFailed,
    /// Backend acknowledged a stop request
    TaskStopped,
    PlanStepUpdated,
    StepStarted,
    StepCompleted,
    Content,
    FileChanged(FileChangeKind),
    FilesList,
    FileContent,
    /// Informational backend status, shown as a system message
    Notice,
    Control,
    Unknown,
}

impl InboundTag {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "task_started" => InboundTag::TaskStarted,
            "plan_ready" | "task_plan_ready" => InboundTag::PlanReady,
            "task_completed" => InboundTag::TaskCompleted,
            "task_failed" => InboundTag::TaskFailed,
            "task_stopped" | "stop_acknowledged" => InboundTag::TaskStopped,
            "plan_step_updated" => InboundTag::PlanStepUpdated,
            "task_step_started" => InboundTag::StepStarted,
            "task_step_completed" => InboundTag::StepCompleted,
            "file_created" => InboundTag::FileChanged(FileChangeKind::Created),
            "file_modified" => InboundTag::FileChanged(FileChangeKind::Modified),
            "file_deleted" => InboundTag::FileChanged(FileChangeKind::Deleted),
            "files_list" => InboundTag::FilesList,
            "file_content" => InboundTag::FileContent,
            "pong" | "ack" => InboundTag::Control,
            "status" | "connected" | "disconnected" | "runtime_starting" | "runtime_ready"
            | "task_planning" | "task_received" => InboundTag::Notice,
            other if crate::message::MessageKind::from_tag(other).is_some() => {
                InboundTag::Content
            }
            _ => InboundTag::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_envelope() {
        let env = Envelope::parse(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(env.kind, "pong");
        assert!(env.data.is_empty());
    }

    #[test]
    fn test_parse_null_data_is_empty() {
        let env = Envelope::parse(r#"{"type":"ack","data":null}"#).unwrap();
        assert!(env.data.is_empty());
    }

    #[test]
    fn test_parse_ignores_extra_top_level_fields() {
        let env =
            Envelope::parse(r#"{"type":"text","data":{"content":"hi"},"timestamp":"2024-01-01"}"#)
                .unwrap();
        assert_eq!(env.str_field("content"), Some("hi"));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert!(Envelope::parse("not json").is_err());
        assert!(Envelope::parse("[1,2,3]").is_err());
        assert!(Envelope::parse(r#"{"data":{}}"#).is_err());
        assert!(Envelope::parse(r#"{"type":42}"#).is_err());
        assert!(Envelope::parse(r#"{"type":"text","data":"oops"}"#).is_err());
    }

    #[test]
    fn test_actions_serialize_to_wire_shape() {
        let chat = Action::Chat {
            content: "build it".to_string(),
        }
        .into_envelope();
        let value: Value = serde_json::from_str(&chat.to_json()).unwrap();
        assert_eq!(value, json!({"type": "chat", "data": {"content": "build it"}}));

        let stop: Value = serde_json::from_str(&Action::Stop.into_envelope().to_json()).unwrap();
        assert_eq!(stop, json!({"type": "stop", "data": {}}));

        let read = Action::ReadFile {
            path: "/workspace/main.rs".to_string(),
        }
        .into_envelope();
        assert_eq!(read.kind, "read_file");
        assert_eq!(read.str_field("path"), Some("/workspace/main.rs"));
    }

    #[test]
    fn test_inbound_tags() {
        assert_eq!(InboundTag::from_tag("task_plan_ready"), InboundTag::PlanReady);
        assert_eq!(InboundTag::from_tag("thinking"), InboundTag::Content);
        assert_eq!(InboundTag::from_tag("terminal_error"), InboundTag::Content);
        assert_eq!(InboundTag::from_tag("pong"), InboundTag::Control);
        assert_eq!(
            InboundTag::from_tag("file_deleted"),
            InboundTag::FileChanged(FileChangeKind::Deleted)
        );
        assert_eq!(InboundTag::from_tag("mystery_event"), InboundTag::Unknown);
    }
}
