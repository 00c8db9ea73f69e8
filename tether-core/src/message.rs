// ABOUTME: Chat transcript types: roles, render kinds, and stored messages.
// ABOUTME: ChatDraft is what the router produces; SessionStore stamps id and time onto it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
}

/// How a message should be rendered. Never affects routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Thinking,
    Action,
    Observation,
    Terminal,
    Error,
}

impl MessageKind {
    /// Map a content tag to a kind, or `None` if the tag isn't a content tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "text" | "agent_message" => Some(MessageKind::Text),
            "thinking" | "agent_thinking" => Some(MessageKind::Thinking),
            "action" | "agent_action" => Some(MessageKind::Action),
            "observation" | "agent_observation" => Some(MessageKind::Observation),
            "terminal" | "terminal_output" | "terminal_error" => Some(MessageKind::Terminal),
            "error" | "agent_error" => Some(MessageKind::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Thinking => "thinking",
            MessageKind::Action => "action",
            MessageKind::Observation => "observation",
            MessageKind::Terminal => "terminal",
            MessageKind::Error => "error",
        }
    }
}

/// A message waiting to be appended to the transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ChatDraft {
    pub role: Role,
    pub kind: MessageKind,
    /// Display text
    pub content: String,
    /// Structured sub-payload (terminal exit codes, error details, ...)
    pub detail: Option<Value>,
}

impl ChatDraft {
    pub fn new(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            role,
            kind,
            content: content.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// One entry in the session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique within a session, strictly increasing by arrival
    pub id: u64,
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_draft(id: u64, draft: ChatDraft) -> Self {
        Self {
            id,
            role: draft.role,
            kind: draft.kind,
            content: draft.content,
            detail: draft.detail,
            timestamp: Utc::now(),
        }
    }
}
