// crates/server/src/live/correlator.rs
//! Identity correlation between logical session ids and scanned processes.
//!
//! Hook events carry an ephemeral session id; process scans produce pids.
//! The two streams share no key, so bindings are established heuristically
//! from independent signals and then held stable: once a session id maps to
//! a live pid, no amount of later evidence moves it. Only pid death frees a
//! mapping.
//!
//! Each signal is a pure function `(candidate, context) -> confidence`; the
//! winner is the single highest score across all signals, not a sum.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use claude_scope_core::{
    directory_label, normalize_dir, transcript_label, CharOverlapScorer, HookEvent,
    SimilarityScorer,
};

use super::process::ProcessIdentity;

/// Exact working-directory match.
const WORKING_DIR_CONFIDENCE: f64 = 0.95;
/// Start-time window and its linear decay bounds.
const START_TIME_WINDOW_SECS: f64 = 30.0;
const START_TIME_MAX: f64 = 0.9;
const START_TIME_FLOOR: f64 = 0.5;
/// Label similarity is the least reliable signal.
const LABEL_WEIGHT: f64 = 0.7;
/// Last-resort binding to an arbitrary unmapped process.
const FALLBACK_CONFIDENCE: f64 = 0.1;

/// How a mapping was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    WorkingDir,
    StartTime,
    Label,
    Fallback,
}

/// A live binding of one logical session id to one pid.
#[derive(Debug, Clone)]
pub struct SessionMapping {
    pub pid: u32,
    pub confidence: f64,
    pub method: MatchMethod,
    pub established_at: i64,
}

/// No live process could be bound to the event's session id. The event is
/// dropped with a diagnostic; nothing else is affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationMiss;

/// Evidence available to the scorers for one resolution attempt.
struct SignalContext<'a> {
    /// When this session id was first observed, unix seconds.
    first_seen: i64,
    /// Working directory recorded in the session's transcript.
    transcript_cwd: Option<&'a Path>,
    /// Label derived from the transcript path.
    transcript_label: Option<&'a str>,
}

fn score_working_dir(
    candidate: &ProcessIdentity,
    ctx: &SignalContext<'_>,
) -> Option<(MatchMethod, f64)> {
    let wanted = ctx.transcript_cwd?;
    let have = candidate.cwd.as_deref()?;
    (normalize_dir(wanted) == normalize_dir(have))
        .then_some((MatchMethod::WorkingDir, WORKING_DIR_CONFIDENCE))
}

fn score_start_time(
    candidate: &ProcessIdentity,
    ctx: &SignalContext<'_>,
) -> Option<(MatchMethod, f64)> {
    let delta = (ctx.first_seen - candidate.start_time as i64).abs() as f64;
    if delta > START_TIME_WINDOW_SECS {
        return None;
    }
    let confidence =
        START_TIME_MAX - (START_TIME_MAX - START_TIME_FLOOR) * (delta / START_TIME_WINDOW_SECS);
    Some((MatchMethod::StartTime, confidence))
}

fn score_label(
    candidate: &ProcessIdentity,
    ctx: &SignalContext<'_>,
    similarity: &dyn SimilarityScorer,
) -> Option<(MatchMethod, f64)> {
    let wanted = ctx.transcript_label?;
    let have = directory_label(candidate.cwd.as_deref()?)?;
    let sim = similarity.similarity(wanted, &have);
    (sim > 0.0).then_some((MatchMethod::Label, sim * LABEL_WEIGHT))
}

/// All correlation bookkeeping. Owned by the monitor and mutated only at
/// its serialization point; everything here is synchronous.
pub struct CorrelationState {
    /// session id -> live mapping. At most one mapping per session id, at
    /// most one session id per pid.
    mappings: HashMap<String, SessionMapping>,
    /// When each session id was first observed (for start-time scoring).
    first_seen: HashMap<String, i64>,
    /// Normalized working directory -> session id, so a discovery-only scan
    /// can adopt a known-but-unmapped session without an event.
    cwd_index: HashMap<PathBuf, String>,
    similarity: Box<dyn SimilarityScorer>,
}

impl CorrelationState {
    pub fn new() -> Self {
        Self::with_scorer(Box::new(CharOverlapScorer))
    }

    pub fn with_scorer(similarity: Box<dyn SimilarityScorer>) -> Self {
        Self {
            mappings: HashMap::new(),
            first_seen: HashMap::new(),
            cwd_index: HashMap::new(),
            similarity,
        }
    }

    pub fn mapping(&self, session_id: &str) -> Option<&SessionMapping> {
        self.mappings.get(session_id)
    }

    /// Record the first observation time of a session id, if not yet seen.
    pub fn note_first_seen(&mut self, session_id: &str, now: i64) {
        self.first_seen
            .entry(session_id.to_string())
            .or_insert(now);
    }

    /// Resolve an event to a pid.
    ///
    /// 1. An existing mapping to a live pid is returned unchanged:
    ///    stability beats any new evidence. A mapping to a dead pid is
    ///    dropped, never reused.
    /// 2. Candidates are the scanned processes not already mapped to a
    ///    different session id.
    /// 3. Each candidate is scored per signal; the single best score wins.
    /// 4. With no positive score, the first unmapped candidate is taken at
    ///    low confidence; liveness is favored over false negatives.
    pub fn resolve(
        &mut self,
        event: &HookEvent,
        processes: &[ProcessIdentity],
        transcript_cwd: Option<&Path>,
        now: i64,
    ) -> Result<u32, CorrelationMiss> {
        let session_id = &event.session_id;

        // Remember the transcript's working directory regardless of the
        // outcome, so a later scan can adopt a matching process even when
        // this resolution misses.
        if let Some(cwd) = transcript_cwd {
            self.cwd_index
                .insert(normalize_dir(cwd), session_id.clone());
        }

        if let Some(existing) = self.mappings.get(session_id) {
            if processes.iter().any(|p| p.pid == existing.pid) {
                return Ok(existing.pid);
            }
            debug!(
                session_id = %session_id,
                pid = existing.pid,
                "mapped pid no longer live; releasing mapping"
            );
            self.mappings.remove(session_id);
        }

        let mapped_pids: HashSet<u32> = self.mappings.values().map(|m| m.pid).collect();
        let candidates: Vec<&ProcessIdentity> = processes
            .iter()
            .filter(|p| !mapped_pids.contains(&p.pid))
            .collect();

        let label = transcript_label(&event.transcript_path);
        let ctx = SignalContext {
            first_seen: self
                .first_seen
                .get(session_id)
                .copied()
                .unwrap_or(now),
            transcript_cwd,
            transcript_label: label.as_deref(),
        };

        let mut best: Option<(u32, MatchMethod, f64)> = None;
        for candidate in &candidates {
            let signals = [
                score_working_dir(candidate, &ctx),
                score_start_time(candidate, &ctx),
                score_label(candidate, &ctx, self.similarity.as_ref()),
            ];
            for (method, confidence) in signals.into_iter().flatten() {
                if best.map_or(true, |(_, _, c)| confidence > c) {
                    best = Some((candidate.pid, method, confidence));
                }
            }
        }

        let (pid, method, confidence) = match best {
            Some(found) => found,
            None => {
                let Some(first) = candidates.first() else {
                    warn!(session_id = %session_id, "no unmapped candidate process; dropping event");
                    return Err(CorrelationMiss);
                };
                warn!(
                    session_id = %session_id,
                    pid = first.pid,
                    "no correlation signal fired; binding first unmapped process at low confidence"
                );
                (first.pid, MatchMethod::Fallback, FALLBACK_CONFIDENCE)
            }
        };

        debug!(
            session_id = %session_id,
            pid,
            method = ?method,
            confidence,
            "session bound"
        );
        self.mappings.insert(
            session_id.clone(),
            SessionMapping {
                pid,
                confidence,
                method,
                established_at: now,
            },
        );
        Ok(pid)
    }

    /// Adopt unmapped processes whose working directory matches a session
    /// known from earlier events but currently without a mapping. Runs at
    /// scan time, with no event in hand.
    pub fn adopt_by_cwd(&mut self, processes: &[ProcessIdentity], now: i64) -> Vec<(String, u32)> {
        let mut mapped_pids: HashSet<u32> = self.mappings.values().map(|m| m.pid).collect();
        let mut adopted = Vec::new();

        for process in processes {
            if mapped_pids.contains(&process.pid) {
                continue;
            }
            let Some(cwd) = &process.cwd else { continue };
            let Some(session_id) = self.cwd_index.get(&normalize_dir(cwd)) else {
                continue;
            };
            if self.mappings.contains_key(session_id) {
                continue;
            }
            let session_id = session_id.clone();
            debug!(session_id = %session_id, pid = process.pid, "adopted process by working directory");
            self.mappings.insert(
                session_id.clone(),
                SessionMapping {
                    pid: process.pid,
                    confidence: WORKING_DIR_CONFIDENCE,
                    method: MatchMethod::WorkingDir,
                    established_at: now,
                },
            );
            mapped_pids.insert(process.pid);
            adopted.push((session_id, process.pid));
        }
        adopted
    }

    /// Drop mappings whose pid vanished from the latest scan. Returns the
    /// freed session ids. The first-seen table and cwd index survive so a
    /// freed session can be re-adopted; newer sessions in the same
    /// directory overwrite the index entry.
    pub fn retain_live(&mut self, live: &HashSet<u32>) -> Vec<String> {
        let freed: Vec<String> = self
            .mappings
            .iter()
            .filter(|(_, m)| !live.contains(&m.pid))
            .map(|(sid, _)| sid.clone())
            .collect();
        for session_id in &freed {
            self.mappings.remove(session_id);
        }
        freed
    }
}

impl Default for CorrelationState {
    fn default() -> Self {
        Self::new()
    }
}
