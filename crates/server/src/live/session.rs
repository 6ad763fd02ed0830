// crates/server/src/live/session.rs
//! Published session records and change events.

use std::path::PathBuf;

use serde::Serialize;

use super::correlator::MatchMethod;
use super::process::ProcessIdentity;

/// Lifecycle state of one monitored session.
///
/// 3-state model: Idle (discovered, no event yet), Working (a tool run is
/// in flight), Waiting (the agent stopped and has output pending).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Working,
    Waiting,
}

/// One monitored session as published to consumers. Keyed by pid.
///
/// A session without a resolved mapping still appears, carrying only its
/// process-derived fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub pid: u32,
    pub state: SessionState,
    /// Logical session id, once an event has been correlated to this pid.
    pub session_id: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub terminal: Option<String>,
    pub transcript_path: Option<PathBuf>,
    /// Tool currently running (set on PreToolUse, cleared on Stop).
    pub current_tool: Option<String>,
    pub task_description: Option<String>,
    /// The agent finished and its output has not been acknowledged yet.
    pub pending_output: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub model: Option<String>,
    /// Confidence and method of the identity mapping, for diagnostics.
    pub confidence: Option<f64>,
    pub method: Option<MatchMethod>,
    pub last_activity_at: i64,
}

impl SessionRecord {
    /// A freshly discovered process with no correlated events yet.
    pub(crate) fn idle(identity: &ProcessIdentity, now: i64) -> Self {
        Self {
            pid: identity.pid,
            state: SessionState::Idle,
            session_id: None,
            working_directory: identity.cwd.clone(),
            terminal: identity.terminal.clone(),
            transcript_path: None,
            current_tool: None,
            task_description: None,
            pending_output: false,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            model: None,
            confidence: None,
            method: None,
            last_activity_at: now,
        }
    }
}

/// Events broadcast to observers whenever the published list changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A pid appeared in a scan for the first time.
    SessionDiscovered { session: SessionRecord },
    /// An existing record changed.
    SessionUpdated { session: SessionRecord },
    /// The session entered Waiting: the monitored agent finished its turn.
    /// Notification collaborators hang off this variant.
    SessionFinished { session: SessionRecord },
    /// The pid vanished from a scan; record and mapping are gone.
    SessionRemoved { pid: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(pid: u32) -> ProcessIdentity {
        ProcessIdentity {
            pid,
            start_time: 100,
            terminal: Some("/dev/pts/1".into()),
            cwd: Some(PathBuf::from("/work/proj")),
            discovered_at: 200,
        }
    }

    #[test]
    fn test_idle_record_copies_process_fields() {
        let record = SessionRecord::idle(&identity(7), 300);
        assert_eq!(record.pid, 7);
        assert_eq!(record.state, SessionState::Idle);
        assert_eq!(record.working_directory.as_deref(), Some(std::path::Path::new("/work/proj")));
        assert_eq!(record.terminal.as_deref(), Some("/dev/pts/1"));
        assert!(record.session_id.is_none());
        assert!(!record.pending_output);
        assert_eq!(record.last_activity_at, 300);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = SessionRecord::idle(&identity(7), 300);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"pendingOutput\":false"));
        assert!(json.contains("\"state\":\"idle\""));
        assert!(json.contains("\"lastActivityAt\":300"));
    }

    #[test]
    fn test_event_tagging() {
        let json = serde_json::to_string(&SessionEvent::SessionRemoved { pid: 9 }).unwrap();
        assert!(json.contains("\"type\":\"session_removed\""));
        assert!(json.contains("\"pid\":9"));
    }
}
