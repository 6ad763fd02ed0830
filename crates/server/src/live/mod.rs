// crates/server/src/live/mod.rs
//! Live session engine: process discovery, identity correlation, the
//! per-session state machine, and the serialized monitor that owns all of
//! their mutable state.

pub mod correlator;
pub mod monitor;
pub mod process;
pub mod session;

use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
