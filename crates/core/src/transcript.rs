// crates/core/src/transcript.rs
//! Transcript parsing and the path-keyed extraction cache.
//!
//! Transcripts are append-only newline-delimited JSON. One pass over a file
//! extracts the task description, token usage totals, detected model, and
//! the session metadata (session id, working directory) used as correlation
//! signals. Malformed lines are skipped, never fatal.
//!
//! Parsing is synchronous; callers on an async runtime wrap these functions
//! in `spawn_blocking`.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex_lite::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::ParseError;

/// Character budget for task descriptions derived from user messages.
const MAX_TASK_DESCRIPTION: usize = 160;

/// Token totals summed across a transcript.
///
/// Cache-creation and cache-read sub-counts are deliberately excluded to
/// match the external accounting convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Everything one parse pass extracts from a transcript file.
#[derive(Debug, Clone, Default)]
pub struct TranscriptInfo {
    /// Most recent summary record, else the most recent user message
    /// (cleaned and truncated).
    pub task_description: Option<String>,
    pub usage: UsageTotals,
    /// Model id from the latest usage-bearing record.
    pub model: Option<String>,
    /// Working directory recorded in the transcript's metadata record.
    pub cwd: Option<PathBuf>,
    /// Session id recorded in the transcript's metadata record.
    pub session_id: Option<String>,
}

/// Parse a transcript file in a single pass.
///
/// Recognized record shapes:
/// - `{"type":"summary","summary":...}`
/// - `{"type":"user"|"conversation","message":{"role","content"}}`
/// - any record carrying `message.usage` (tokens) and `message.model`
/// - metadata records carrying top-level `sessionId` / `cwd`
///
/// Unparsable lines and unknown record types are skipped with a debug log.
pub fn parse_transcript(path: &Path) -> Result<TranscriptInfo, ParseError> {
    let file = File::open(path).map_err(|e| ParseError::io(path, e))?;
    let reader = BufReader::new(file);

    let command_name = Regex::new(r"(?s)<command-name>.*?</command-name>\s*").unwrap();
    let command_args = Regex::new(r"(?s)<command-args>.*?</command-args>\s*").unwrap();
    let command_message = Regex::new(r"(?s)<command-message>.*?</command-message>\s*").unwrap();

    let mut info = TranscriptInfo::default();
    let mut last_summary: Option<String> = None;
    let mut last_user: Option<String> = None;
    let mut line_number = 0usize;

    for line in reader.lines() {
        line_number += 1;
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                // Invalid UTF-8 or a read hiccup mid-file: skip the record.
                debug!(path = %path.display(), line = line_number, error = %e, "unreadable transcript line");
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                debug!(path = %path.display(), line = line_number, error = %e, "skipping malformed transcript record");
                continue;
            }
        };

        // Metadata record: top-level sessionId / cwd.
        if let Some(sid) = value.get("sessionId").and_then(|v| v.as_str()) {
            info.session_id = Some(sid.to_string());
        }
        if let Some(cwd) = value.get("cwd").and_then(|v| v.as_str()) {
            info.cwd = Some(PathBuf::from(cwd));
        }

        match value.get("type").and_then(|t| t.as_str()) {
            Some("summary") => {
                if let Some(s) = value.get("summary").and_then(|v| v.as_str()) {
                    if !s.trim().is_empty() {
                        last_summary = Some(s.trim().to_string());
                    }
                }
            }
            Some("user") | Some("conversation") => {
                let message = value.get("message");
                let is_user = message
                    .and_then(|m| m.get("role"))
                    .and_then(|r| r.as_str())
                    .map_or(false, |r| r == "user");
                if is_user {
                    if let Some(content) = message.and_then(|m| m.get("content")) {
                        let text = extract_text(content);
                        let cleaned = clean_user_message(
                            &text,
                            &command_name,
                            &command_args,
                            &command_message,
                        );
                        if !cleaned.is_empty() {
                            last_user = Some(cleaned);
                        }
                    }
                }
            }
            _ => {}
        }

        // Usage and model live under `message` on assistant records, but
        // any record shape carrying them counts.
        if let Some(message) = value.get("message") {
            if let Some(usage) = message.get("usage") {
                info.usage.input_tokens += usage
                    .get("input_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                info.usage.output_tokens += usage
                    .get("output_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
            }
            if let Some(model) = message.get("model").and_then(|v| v.as_str()) {
                info.model = Some(model.to_string());
            }
        }
    }

    info.task_description = last_summary.or_else(|| last_user.map(|u| truncate_chars(&u, MAX_TASK_DESCRIPTION)));
    Ok(info)
}

/// Flatten a message `content` field to plain text: either a string or an
/// array of blocks whose text parts are concatenated.
fn extract_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Strip command tags and collapse whitespace runs.
fn clean_user_message(
    text: &str,
    command_name: &Regex,
    command_args: &Regex,
    command_message: &Regex,
) -> String {
    let text = command_name.replace_all(text, "");
    let text = command_args.replace_all(&text, "");
    let text = command_message.replace_all(&text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Extraction cache keyed by transcript file path.
///
/// Entries persist until an explicit [`clear`](Self::clear) or per-path
/// [`evict`](Self::evict); there is no TTL, because refresh is on-demand.
/// Keying by path (never by session id) sidesteps ambiguous or reused
/// session ids.
#[derive(Default)]
pub struct TranscriptStore {
    cache: RwLock<HashMap<PathBuf, Arc<TranscriptInfo>>>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached extraction for a transcript. Parses at most once per path
    /// until the entry is evicted.
    pub fn info(&self, path: &Path) -> Result<Arc<TranscriptInfo>, ParseError> {
        if let Some(hit) = self
            .cache
            .read()
            .expect("transcript cache lock poisoned")
            .get(path)
        {
            return Ok(hit.clone());
        }
        let parsed = Arc::new(parse_transcript(path)?);
        self.cache
            .write()
            .expect("transcript cache lock poisoned")
            .insert(path.to_path_buf(), parsed.clone());
        Ok(parsed)
    }

    /// Drop one cached entry so the next lookup re-parses.
    pub fn evict(&self, path: &Path) {
        self.cache
            .write()
            .expect("transcript cache lock poisoned")
            .remove(path);
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache
            .write()
            .expect("transcript cache lock poisoned")
            .clear();
    }
}
