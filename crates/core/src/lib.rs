// crates/core/src/lib.rs
//! Core library for claude-scope: hook-event boundary types, transcript
//! parsing and caching, per-model cost accounting, and the label/similarity
//! helpers used by identity correlation.
//!
//! This crate is leaf-level: no async runtime, no HTTP. All file I/O is
//! synchronous; the server wraps calls in `tokio::task::spawn_blocking`.

pub mod cost;
pub mod error;
pub mod event;
pub mod label;
pub mod transcript;

pub use cost::*;
pub use error::*;
pub use event::*;
pub use label::*;
pub use transcript::*;
