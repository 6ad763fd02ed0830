// crates/core/src/label.rs
//! Label derivation and string similarity for correlation signals.
//!
//! Transcripts live under a per-project directory whose name encodes the
//! project path with dashes (`-Users-jane-src-myproj`). The label of a
//! transcript is the final segment of that encoding; the label of a
//! candidate process is the final component of its working directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Normalize a directory path for comparison: resolve symlinks when the
/// path exists on disk, otherwise fall back to the lexical form. Trailing
/// slashes never survive (`Path` components drop them).
pub fn normalize_dir(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.components().collect())
}

/// Derive a short lowercase label from a transcript path.
pub fn transcript_label(transcript_path: &Path) -> Option<String> {
    let dir = transcript_path.parent()?.file_name()?.to_str()?;
    let segment = dir.rsplit('-').find(|s| !s.is_empty())?;
    Some(segment.to_ascii_lowercase())
}

/// Derive a short lowercase label from a working directory.
pub fn directory_label(cwd: &Path) -> Option<String> {
    cwd.file_name()?.to_str().map(str::to_ascii_lowercase)
}

/// Pluggable string-similarity measure used by the label correlation signal.
pub trait SimilarityScorer: Send + Sync {
    /// Similarity of two labels in [0, 1].
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Default scorer: exact match 1.0, substring containment 0.8, otherwise
/// the shared-character ratio against the longer label.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharOverlapScorer;

impl SimilarityScorer for CharOverlapScorer {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if a == b {
            return 1.0;
        }
        if a.contains(b) || b.contains(a) {
            return 0.8;
        }

        // Multiset intersection of characters.
        let mut counts: HashMap<char, i64> = HashMap::new();
        for c in a.chars() {
            *counts.entry(c).or_insert(0) += 1;
        }
        let mut shared = 0usize;
        for c in b.chars() {
            if let Some(n) = counts.get_mut(&c) {
                if *n > 0 {
                    *n -= 1;
                    shared += 1;
                }
            }
        }
        let longer = a.chars().count().max(b.chars().count());
        shared as f64 / longer as f64
    }
}
