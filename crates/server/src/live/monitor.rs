// crates/server/src/live/monitor.rs
//! The serialization point of the engine.
//!
//! `SessionMonitor` owns every mutable table (the correlation state, the
//! session-record table, the display order, the latest process snapshot)
//! behind one mutex. Two inputs feed it: the ordered hook-event channel
//! (single consumer, so concurrent arrivals are never reordered) and the
//! periodic process rescan. Consumers only ever receive snapshots and
//! broadcast events.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use claude_scope_core::{
    cost_usd, default_rates, HookEvent, HookEventKind, ModelRates, TranscriptStore,
};

use super::correlator::{CorrelationMiss, CorrelationState};
use super::process::{list_processes, ProcessIdentity};
use super::session::{SessionEvent, SessionRecord, SessionState};
use super::unix_now;

/// Tunables for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between full process rescans.
    pub scan_interval: Duration,
    /// Capacity of the ordered event delivery channel.
    pub event_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            event_buffer: 256,
        }
    }
}

/// Everything the monitor mutates, behind one lock.
struct MonitorState {
    correlation: CorrelationState,
    records: HashMap<u32, SessionRecord>,
    /// Display order of pids; reordering is presentation-only.
    order: Vec<u32>,
    /// Latest scan result; sole source of truth for pid liveness.
    processes: Vec<ProcessIdentity>,
    /// Per-pid usage-refresh generation; a newer request supersedes an
    /// in-flight one.
    refresh_gen: HashMap<u32, u64>,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            correlation: CorrelationState::new(),
            records: HashMap::new(),
            order: Vec::new(),
            processes: Vec::new(),
            refresh_gen: HashMap::new(),
        }
    }
}

pub struct SessionMonitor {
    state: Mutex<MonitorState>,
    tx: broadcast::Sender<SessionEvent>,
    transcripts: Arc<TranscriptStore>,
    rates: HashMap<String, ModelRates>,
}

impl SessionMonitor {
    /// Construct a monitor without background tasks. Callers drive it via
    /// [`handle_event`](Self::handle_event) and
    /// [`apply_scan`](Self::apply_scan), or wire their own channels with
    /// [`spawn_event_loop`](Self::spawn_event_loop).
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new(Self {
            state: Mutex::new(MonitorState::new()),
            tx,
            transcripts: Arc::new(TranscriptStore::new()),
            rates: default_rates(),
        })
    }

    /// Start the monitor with its background tasks: the event dispatch
    /// loop and the periodic rescan. Returns the shared handle and the
    /// sender the HTTP listener feeds.
    pub fn start(config: MonitorConfig) -> (Arc<Self>, mpsc::Sender<HookEvent>) {
        let monitor = Self::new();
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        monitor.spawn_event_loop(event_rx);
        monitor.spawn_rescan_task(config.scan_interval);
        info!(
            scan_interval_secs = config.scan_interval.as_secs(),
            "session monitor started"
        );
        (monitor, event_tx)
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Consume the ordered event channel. Single consumer: events for the
    /// same session id are applied in arrival order.
    pub fn spawn_event_loop(self: &Arc<Self>, mut rx: mpsc::Receiver<HookEvent>) {
        let monitor = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                monitor.handle_event(event).await;
            }
        });
    }

    fn spawn_rescan_task(self: &Arc<Self>, every: Duration) {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let scanned = tokio::task::spawn_blocking(list_processes)
                    .await
                    .unwrap_or_default();
                monitor.apply_scan(scanned).await;
            }
        });
    }

    /// Apply one hook event end-to-end: correlate, then run the state
    /// machine on the bound record.
    pub async fn handle_event(&self, event: HookEvent) {
        let now = event.received_at.timestamp();

        // Transcript signals are read outside the lock; staleness is an
        // accepted tradeoff.
        let transcripts = self.transcripts.clone();
        let transcript_path = event.transcript_path.clone();
        let info = tokio::task::spawn_blocking(move || transcripts.info(&transcript_path).ok())
            .await
            .unwrap_or(None);

        let mut discovered = None;
        let (updated, finished) = {
            let mut state = self.state.lock().await;
            let st = &mut *state;

            st.correlation.note_first_seen(&event.session_id, now);
            let transcript_cwd = info.as_ref().and_then(|i| i.cwd.as_deref());
            let pid = match st
                .correlation
                .resolve(&event, &st.processes, transcript_cwd, now)
            {
                Ok(pid) => pid,
                Err(CorrelationMiss) => {
                    warn!(
                        session_id = %event.session_id,
                        kind = event.kind.as_str(),
                        "dropping event with no resolvable process"
                    );
                    return;
                }
            };

            if !st.records.contains_key(&pid) {
                // The record normally exists from the scan that produced
                // this candidate; recreate defensively if a removal raced.
                let Some(identity) = st.processes.iter().find(|p| p.pid == pid) else {
                    warn!(pid, "resolved pid missing from latest scan; dropping event");
                    return;
                };
                st.records.insert(pid, SessionRecord::idle(identity, now));
                st.order.push(pid);
                discovered = Some(pid);
            }
            let record = st
                .records
                .get_mut(&pid)
                .expect("record inserted above");

            record.session_id = Some(event.session_id.clone());
            record.transcript_path = Some(event.transcript_path.clone());
            if let Some(mapping) = st.correlation.mapping(&event.session_id) {
                record.confidence = Some(mapping.confidence);
                record.method = Some(mapping.method);
            }
            if let Some(info) = info.as_deref() {
                if info.task_description.is_some() {
                    record.task_description = info.task_description.clone();
                }
                if info.model.is_some() {
                    record.model = info.model.clone();
                }
                if record.working_directory.is_none() {
                    record.working_directory = info.cwd.clone();
                }
            }
            record.last_activity_at = now;

            let mut finished = false;
            match event.kind {
                HookEventKind::PreToolUse => {
                    record.state = SessionState::Working;
                    record.current_tool = event.tool_name.clone();
                    record.pending_output = false;
                }
                HookEventKind::PostToolUse => {
                    // Activity refresh only; no state change.
                }
                HookEventKind::Stop | HookEventKind::Notification => {
                    record.state = SessionState::Waiting;
                    record.current_tool = None;
                    record.pending_output = true;
                    finished = true;
                }
            }
            (record.clone(), finished)
        };

        if let Some(pid) = discovered {
            debug!(pid, "record created for event that raced a scan");
            let _ = self.tx.send(SessionEvent::SessionDiscovered {
                session: updated.clone(),
            });
        }
        if finished {
            let _ = self.tx.send(SessionEvent::SessionFinished {
                session: updated.clone(),
            });
        }
        let _ = self.tx.send(SessionEvent::SessionUpdated { session: updated });
    }

    /// Merge a full process rescan. New pids become Idle records, dead pids
    /// lose record and mapping together, and known-but-unmapped sessions
    /// are adopted by working directory.
    pub async fn apply_scan(&self, scanned: Vec<ProcessIdentity>) {
        let now = unix_now();
        let mut discovered = Vec::new();
        let mut adopted = Vec::new();
        let mut removed = Vec::new();

        {
            let mut state = self.state.lock().await;
            let st = &mut *state;

            let live: HashSet<u32> = scanned.iter().map(|p| p.pid).collect();

            for session_id in st.correlation.retain_live(&live) {
                debug!(session_id = %session_id, "mapping released; pid no longer live");
            }
            st.records.retain(|pid, _| {
                let keep = live.contains(pid);
                if !keep {
                    removed.push(*pid);
                }
                keep
            });
            st.order.retain(|pid| live.contains(pid));
            for pid in &removed {
                st.refresh_gen.remove(pid);
            }

            for identity in &scanned {
                match st.records.get_mut(&identity.pid) {
                    Some(record) => {
                        // Refresh process-derived fields that may have been
                        // unreadable on earlier scans.
                        if record.working_directory.is_none() {
                            record.working_directory = identity.cwd.clone();
                        }
                        if record.terminal.is_none() {
                            record.terminal = identity.terminal.clone();
                        }
                    }
                    None => {
                        let record = SessionRecord::idle(identity, now);
                        st.order.push(identity.pid);
                        st.records.insert(identity.pid, record.clone());
                        discovered.push(record);
                    }
                }
            }

            for (session_id, pid) in st.correlation.adopt_by_cwd(&scanned, now) {
                if let Some(record) = st.records.get_mut(&pid) {
                    record.session_id = Some(session_id.clone());
                    if let Some(mapping) = st.correlation.mapping(&session_id) {
                        record.confidence = Some(mapping.confidence);
                        record.method = Some(mapping.method);
                    }
                    adopted.push(record.clone());
                }
            }

            st.processes = scanned;
        }

        for record in discovered {
            let _ = self.tx.send(SessionEvent::SessionDiscovered { session: record });
        }
        for record in adopted {
            let _ = self.tx.send(SessionEvent::SessionUpdated { session: record });
        }
        for pid in removed {
            let _ = self.tx.send(SessionEvent::SessionRemoved { pid });
        }
    }

    /// The published list: records cloned under the lock in display order.
    pub async fn snapshot(&self) -> Vec<SessionRecord> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|pid| state.records.get(pid))
            .cloned()
            .collect()
    }

    /// Clear the pending-output flag. Never changes Working/Waiting.
    pub async fn acknowledge(&self, pid: u32) -> bool {
        let updated = {
            let mut state = self.state.lock().await;
            match state.records.get_mut(&pid) {
                Some(record) => {
                    record.pending_output = false;
                    Some(record.clone())
                }
                None => None,
            }
        };
        match updated {
            Some(session) => {
                let _ = self.tx.send(SessionEvent::SessionUpdated { session });
                true
            }
            None => false,
        }
    }

    /// Move a session to a new position in the published order.
    /// Presentation only; correlation state is untouched by construction.
    pub async fn reorder(&self, pid: u32, new_index: usize) -> bool {
        let mut state = self.state.lock().await;
        let Some(current) = state.order.iter().position(|p| *p == pid) else {
            return false;
        };
        let pid = state.order.remove(current);
        let index = new_index.min(state.order.len());
        state.order.insert(index, pid);
        true
    }

    /// Re-read a session's transcript and update usage and cost.
    ///
    /// Explicit and asynchronous; a newer request for the same pid
    /// supersedes an in-flight one via the generation counter.
    pub async fn refresh(self: &Arc<Self>, pid: u32) -> bool {
        let (path, generation) = {
            let mut state = self.state.lock().await;
            let Some(record) = state.records.get(&pid) else {
                return false;
            };
            let Some(path) = record.transcript_path.clone() else {
                debug!(pid, "refresh requested for session without a transcript");
                return false;
            };
            let generation = state.refresh_gen.entry(pid).or_insert(0);
            *generation += 1;
            (path, *generation)
        };

        let monitor = self.clone();
        tokio::spawn(async move {
            let transcripts = monitor.transcripts.clone();
            let parse_path = path.clone();
            let parsed = tokio::task::spawn_blocking(move || {
                transcripts.evict(&parse_path);
                transcripts.info(&parse_path)
            })
            .await;

            let info = match parsed {
                Ok(Ok(info)) => info,
                Ok(Err(e)) => {
                    debug!(pid, error = %e, "usage refresh failed");
                    return;
                }
                Err(e) => {
                    error!(pid, error = %e, "usage refresh task panicked");
                    return;
                }
            };

            let updated = {
                let mut state = monitor.state.lock().await;
                if state.refresh_gen.get(&pid).copied() != Some(generation) {
                    debug!(pid, generation, "usage refresh superseded");
                    return;
                }
                let Some(record) = state.records.get_mut(&pid) else {
                    return;
                };
                record.input_tokens = info.usage.input_tokens;
                record.output_tokens = info.usage.output_tokens;
                if info.model.is_some() {
                    record.model = info.model.clone();
                }
                if info.task_description.is_some() {
                    record.task_description = info.task_description.clone();
                }
                record.cost_usd = cost_usd(
                    record.input_tokens,
                    record.output_tokens,
                    record.model.as_deref(),
                    &monitor.rates,
                );
                record.clone()
            };
            let _ = monitor.tx.send(SessionEvent::SessionUpdated { session: updated });
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;
    use std::path::PathBuf;

    fn process(pid: u32, start_time: u64, cwd: Option<PathBuf>) -> ProcessIdentity {
        ProcessIdentity {
            pid,
            start_time,
            terminal: None,
            cwd,
            discovered_at: 0,
        }
    }

    fn event(kind: HookEventKind, session_id: &str, transcript: &std::path::Path) -> HookEvent {
        HookEvent {
            kind,
            session_id: session_id.into(),
            transcript_path: transcript.to_path_buf(),
            tool_name: None,
            tool_details: None,
            received_at: Utc::now(),
        }
    }

    /// A transcript whose metadata record points at `cwd`.
    fn transcript_in(dir: &std::path::Path, cwd: &std::path::Path, extra: &[&str]) -> PathBuf {
        let path = dir.join("session.jsonl");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"{{"sessionId":"S1","cwd":"{}"}}"#,
            cwd.display()
        )
        .unwrap();
        for line in extra {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[tokio::test]
    async fn test_scan_discovers_and_removes_records() {
        let monitor = SessionMonitor::new();
        let mut rx = monitor.subscribe();

        monitor
            .apply_scan(vec![process(1, 100, None), process(2, 200, None)])
            .await;
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|r| r.state == SessionState::Idle));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::SessionDiscovered { .. }
        ));

        // Pid 1 disappears.
        monitor.apply_scan(vec![process(2, 200, None)]).await;
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].pid, 2);
    }

    #[tokio::test]
    async fn test_working_to_waiting_flow() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("proj");
        std::fs::create_dir(&cwd).unwrap();
        let transcript = transcript_in(dir.path(), &cwd, &[]);

        let monitor = SessionMonitor::new();
        monitor
            .apply_scan(vec![process(7, 0, Some(cwd.clone()))])
            .await;

        let mut pre = event(HookEventKind::PreToolUse, "S1", &transcript);
        pre.tool_name = Some("Bash".into());
        monitor.handle_event(pre).await;

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot[0].state, SessionState::Working);
        assert_eq!(snapshot[0].current_tool.as_deref(), Some("Bash"));
        assert_eq!(snapshot[0].session_id.as_deref(), Some("S1"));
        assert!(!snapshot[0].pending_output);

        monitor
            .handle_event(event(HookEventKind::PostToolUse, "S1", &transcript))
            .await;
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot[0].state, SessionState::Working);

        let mut finished_rx = monitor.subscribe();
        monitor
            .handle_event(event(HookEventKind::Stop, "S1", &transcript))
            .await;
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot[0].state, SessionState::Waiting);
        assert!(snapshot[0].current_tool.is_none());
        assert!(snapshot[0].pending_output);
        assert!(matches!(
            finished_rx.recv().await.unwrap(),
            SessionEvent::SessionFinished { .. }
        ));
    }

    #[tokio::test]
    async fn test_mapping_stable_across_event_and_scan_interleavings() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("proj");
        std::fs::create_dir(&cwd).unwrap();
        let transcript = transcript_in(dir.path(), &cwd, &[]);

        let processes = vec![
            process(7, 0, Some(cwd.clone())),
            process(8, 0, Some(dir.path().join("other"))),
        ];

        let monitor = SessionMonitor::new();
        monitor.apply_scan(processes.clone()).await;
        monitor
            .handle_event(event(HookEventKind::PreToolUse, "S1", &transcript))
            .await;
        let bound = monitor.snapshot().await[0].pid;

        // Rescans and further events never move the binding.
        for _ in 0..3 {
            monitor.apply_scan(processes.clone()).await;
            monitor
                .handle_event(event(HookEventKind::PostToolUse, "S1", &transcript))
                .await;
            let with_session: Vec<u32> = monitor
                .snapshot()
                .await
                .iter()
                .filter(|r| r.session_id.as_deref() == Some("S1"))
                .map(|r| r.pid)
                .collect();
            assert_eq!(with_session, vec![bound]);
        }
    }

    #[tokio::test]
    async fn test_event_without_processes_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = transcript_in(dir.path(), dir.path(), &[]);

        let monitor = SessionMonitor::new();
        monitor
            .handle_event(event(HookEventKind::PreToolUse, "S1", &transcript))
            .await;
        assert!(monitor.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_clears_pending_only() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("proj");
        std::fs::create_dir(&cwd).unwrap();
        let transcript = transcript_in(dir.path(), &cwd, &[]);

        let monitor = SessionMonitor::new();
        monitor.apply_scan(vec![process(7, 0, Some(cwd))]).await;
        monitor
            .handle_event(event(HookEventKind::Stop, "S1", &transcript))
            .await;

        assert!(monitor.acknowledge(7).await);
        let snapshot = monitor.snapshot().await;
        assert!(!snapshot[0].pending_output);
        // Still Waiting: acknowledge never reclassifies.
        assert_eq!(snapshot[0].state, SessionState::Waiting);

        assert!(!monitor.acknowledge(999).await);
    }

    #[tokio::test]
    async fn test_reorder_is_display_only() {
        let monitor = SessionMonitor::new();
        monitor
            .apply_scan(vec![
                process(1, 0, None),
                process(2, 0, None),
                process(3, 0, None),
            ])
            .await;

        assert!(monitor.reorder(3, 0).await);
        let pids: Vec<u32> = monitor.snapshot().await.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![3, 1, 2]);

        // Out-of-range index clamps to the end.
        assert!(monitor.reorder(3, 99).await);
        let pids: Vec<u32> = monitor.snapshot().await.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![1, 2, 3]);

        assert!(!monitor.reorder(42, 0).await);
    }

    #[tokio::test]
    async fn test_refresh_applies_usage_and_cost() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("proj");
        std::fs::create_dir(&cwd).unwrap();
        let transcript = transcript_in(
            dir.path(),
            &cwd,
            &[
                r#"{"type":"assistant","message":{"model":"claude-haiku-4-5","usage":{"input_tokens":100,"output_tokens":50}}}"#,
                r#"{"type":"assistant","message":{"usage":{"input_tokens":20,"output_tokens":5}}}"#,
            ],
        );

        let monitor = SessionMonitor::new();
        monitor.apply_scan(vec![process(7, 0, Some(cwd))]).await;
        monitor
            .handle_event(event(HookEventKind::PreToolUse, "S1", &transcript))
            .await;

        assert!(monitor.refresh(7).await);

        // The refresh task runs in the background; poll the snapshot.
        let mut tokens = (0, 0);
        for _ in 0..100 {
            let snapshot = monitor.snapshot().await;
            tokens = (snapshot[0].input_tokens, snapshot[0].output_tokens);
            if tokens.0 > 0 {
                let expected = 120.0 * 1.0 / 1e6 + 55.0 * 5.0 / 1e6;
                assert!((snapshot[0].cost_usd - expected).abs() < 1e-12);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(tokens, (120, 55));
    }

    #[tokio::test]
    async fn test_refresh_unknown_pid_is_false() {
        let monitor = SessionMonitor::new();
        assert!(!monitor.refresh(1).await);
    }

    #[tokio::test]
    async fn test_adoption_after_scan_only() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("proj");
        std::fs::create_dir(&cwd).unwrap();
        let transcript = transcript_in(dir.path(), &cwd, &[]);

        let monitor = SessionMonitor::new();
        monitor
            .apply_scan(vec![process(7, 0, Some(cwd.clone()))])
            .await;
        monitor
            .handle_event(event(HookEventKind::PreToolUse, "S1", &transcript))
            .await;

        // Pid 7 dies, a new process appears later in the same directory.
        monitor.apply_scan(vec![]).await;
        monitor.apply_scan(vec![process(9, 0, Some(cwd))]).await;

        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].pid, 9);
        assert_eq!(snapshot[0].session_id.as_deref(), Some("S1"));
    }
}
