// crates/server/src/live/process.rs
//! Process discovery for running Claude Code instances.
//!
//! Scans the system process table for processes whose name contains
//! "claude" and captures best-effort identity attributes. A missing
//! attribute (unreadable cwd, no controlling terminal) never excludes the
//! process; a failed scan yields an empty list.

use std::path::{Path, PathBuf};

use sysinfo::{ProcessesToUpdate, System};
use thiserror::Error;
use tracing::debug;

use super::unix_now;

/// Best-effort identity of one candidate OS process.
///
/// Rebuilt on every scan; identity equality is by pid.
#[derive(Debug, Clone)]
pub struct ProcessIdentity {
    pub pid: u32,
    /// Unix timestamp the process started.
    pub start_time: u64,
    /// Controlling terminal device, when resolvable (e.g. "/dev/pts/3").
    pub terminal: Option<String>,
    /// Working directory, when readable.
    pub cwd: Option<PathBuf>,
    /// Unix timestamp of the scan that produced this record.
    pub discovered_at: i64,
}

/// Errors from per-attribute OS introspection. Always degraded to a
/// missing field, never propagated out of a scan.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("terminal lookup is not supported on this platform")]
    Unsupported,

    #[error("could not inspect pid {pid}: {source}")]
    Io {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Enumerate candidate processes.
///
/// Read-only and idempotent. Does synchronous system calls; call from
/// `tokio::task::spawn_blocking`.
pub fn list_processes() -> Vec<ProcessIdentity> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let now = unix_now();
    let mut found = Vec::new();
    for (pid, process) in sys.processes() {
        let name = process.name().to_string_lossy();
        if !name.contains("claude") {
            continue;
        }
        let pid = pid.as_u32();
        let terminal = match terminal_device(pid) {
            Ok(tty) => Some(tty),
            Err(e) => {
                debug!(pid, error = %e, "terminal lookup failed");
                None
            }
        };
        found.push(ProcessIdentity {
            pid,
            start_time: process.start_time(),
            terminal,
            cwd: process.cwd().map(Path::to_path_buf),
            discovered_at: now,
        });
    }
    found
}

/// Resolve the controlling terminal of a pid via /proc.
#[cfg(target_os = "linux")]
fn terminal_device(pid: u32) -> Result<String, DiscoveryError> {
    let link = std::fs::read_link(format!("/proc/{pid}/fd/0"))
        .map_err(|source| DiscoveryError::Io { pid, source })?;
    Ok(link.to_string_lossy().into_owned())
}

#[cfg(not(target_os = "linux"))]
fn terminal_device(_pid: u32) -> Result<String, DiscoveryError> {
    Err(DiscoveryError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_processes_does_not_panic() {
        // No Claude process is guaranteed to run during tests; an empty
        // result is fine.
        let _ = list_processes();
    }

    #[test]
    fn test_identity_fields_are_optional() {
        let identity = ProcessIdentity {
            pid: 42,
            start_time: 1000,
            terminal: None,
            cwd: None,
            discovered_at: 2000,
        };
        assert_eq!(identity.pid, 42);
        assert!(identity.cwd.is_none());
        assert!(identity.terminal.is_none());
    }
}
