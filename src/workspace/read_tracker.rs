//! `FileReadTracker`: enforces read-before-write for the workspace tools.
//!
//! §4.7: a write/edit to a path the run has not yet read (in this run) is
//! rejected by default, so the model can't blindly overwrite a file it
//! never inspected. Grounded on similar guardrails in the teacher's tool
//! policy layer, applied here to the filesystem-tool set specifically.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

/// Tracks which paths have been read during a run, normalized the same way
/// [`crate::workspace::lock::FileWriteLock`] normalizes them so a read of
/// `./a.txt` satisfies a later write to `a.txt`.
#[derive(Clone, Default)]
pub struct FileReadTracker {
    read: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FileReadTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(path: &Path) -> PathBuf {
        path.components().collect()
    }

    /// Record that `path` has been read.
    pub async fn record_read(&self, path: &Path) {
        self.read.lock().await.insert(Self::normalize(path));
    }

    /// Whether `path` has been read during this run.
    pub async fn has_been_read(&self, path: &Path) -> bool {
        self.read.lock().await.contains(&Self::normalize(path))
    }
}
