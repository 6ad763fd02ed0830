// crates/core/src/event.rs
//! Hook-event boundary types.
//!
//! Hook payloads arrive as loosely-typed JSON from whatever shell hook the
//! monitored CLI runs. Everything is validated into these structures at the
//! listener boundary; a payload that does not conform is rejected there and
//! never reaches the correlator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four hook kinds the ingestion listener accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventKind {
    PreToolUse,
    PostToolUse,
    Stop,
    Notification,
}

impl HookEventKind {
    /// Parse the lowercase `{kind}` segment of `POST /hook/{kind}`.
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "pretooluse" => Some(Self::PreToolUse),
            "posttooluse" => Some(Self::PostToolUse),
            "stop" => Some(Self::Stop),
            "notification" => Some(Self::Notification),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreToolUse => "pretooluse",
            Self::PostToolUse => "posttooluse",
            Self::Stop => "stop",
            Self::Notification => "notification",
        }
    }
}

/// Structured fields a hook may attach describing the tool invocation.
/// All optional; unknown fields are ignored for forward compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolDetails {
    pub command: Option<String>,
    pub file_path: Option<String>,
    pub pattern: Option<String>,
    pub old_string: Option<String>,
    pub new_string: Option<String>,
    pub content: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Wire payload of one hook call.
///
/// `session_id` and `transcript_path` are mandatory; a body missing either
/// is a protocol error.
#[derive(Debug, Clone, Deserialize)]
pub struct HookPayload {
    pub session_id: String,
    pub transcript_path: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_details: Option<ToolDetails>,
}

/// A validated hook event as it travels the delivery channel.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub kind: HookEventKind,
    pub session_id: String,
    pub transcript_path: PathBuf,
    pub tool_name: Option<String>,
    pub tool_details: Option<ToolDetails>,
    pub received_at: DateTime<Utc>,
}

impl HookEvent {
    /// Stamp a validated payload with the receive time.
    pub fn from_payload(kind: HookEventKind, payload: HookPayload) -> Self {
        Self {
            kind,
            session_id: payload.session_id,
            transcript_path: PathBuf::from(payload.transcript_path),
            tool_name: payload.tool_name,
            tool_details: payload.tool_details,
            received_at: Utc::now(),
        }
    }
}
