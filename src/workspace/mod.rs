//! The workspace filesystem tool layer (§4.7): read/write/edit/list/delete/
//! mkdir/grep/ast_edit/execute_command/get_process_output/kill_process,
//! gated by read-before-write tracking and a per-path FIFO write lock.

pub mod lock;
pub mod process_table;
pub mod read_tracker;
pub mod tools;

use std::path::{Path, PathBuf};

use crate::error::ToolError;
use lock::FileWriteLock;
use process_table::ProcessTable;
use read_tracker::FileReadTracker;

/// Per-run configuration for the workspace tool layer, built the way the
/// teacher builds `AgentConfig` (a plain struct, `Default` plus `with_*`
/// builders, not a trait).
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Whether workspace tools are registered at all.
    pub enabled: bool,
    /// Root directory every tool path is resolved and confined to.
    pub root: PathBuf,
    /// Whether destructive tools (`delete`, `write_file` over an existing
    /// file, `execute_command`) require confirmation.
    pub require_approval: bool,
    /// Whether `write_file`/`edit_file` require the path to have been read
    /// first in this run (§4.7's read-before-write enforcement).
    pub require_read_before_write: bool,
    /// Maximum tokens (approximate) any single tool result may inject into
    /// the conversation before truncation.
    pub max_output_tokens: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("."),
            require_approval: true,
            require_read_before_write: true,
            max_output_tokens: 4_000,
        }
    }
}

impl WorkspaceConfig {
    /// Set the workspace root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Disable read-before-write enforcement.
    #[must_use]
    pub fn without_read_before_write(mut self) -> Self {
        self.require_read_before_write = false;
        self
    }

    /// Set the output truncation budget.
    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Shared state every workspace tool handler needs: the config, the write
/// lock registry, and the read tracker. Cloning is cheap — everything
/// inside is an `Arc`.
#[derive(Clone)]
pub struct WorkspaceContext {
    /// The workspace configuration.
    pub config: WorkspaceConfig,
    /// The per-path write lock registry.
    pub write_lock: FileWriteLock,
    /// The read-before-write tracker.
    pub read_tracker: FileReadTracker,
    /// Background processes spawned by `execute_command`, keyed by PID.
    pub process_table: ProcessTable,
}

impl WorkspaceContext {
    /// Build a fresh workspace context.
    #[must_use]
    pub fn new(config: WorkspaceConfig) -> Self {
        Self {
            config,
            write_lock: FileWriteLock::new(),
            read_tracker: FileReadTracker::new(),
            process_table: ProcessTable::new(),
        }
    }

    /// Resolve a tool-supplied relative path against the workspace root,
    /// rejecting any path that would escape it (`..` traversal).
    ///
    /// # Errors
    /// Returns [`ToolError::InvalidArgs`] if the resolved path is not
    /// contained within `self.config.root`.
    pub fn resolve(&self, tool_name: &str, requested: &str) -> Result<PathBuf, ToolError> {
        let joined = self.config.root.join(requested);
        let normalized = normalize_lexically(&joined);

        let root_normalized = normalize_lexically(&self.config.root);
        if !normalized.starts_with(&root_normalized) {
            return Err(ToolError::InvalidArgs {
                tool: tool_name.to_string(),
                message: format!("path '{requested}' escapes the workspace root"),
            });
        }
        Ok(normalized)
    }

    /// Enforce read-before-write for a resolved path, if configured.
    ///
    /// # Errors
    /// Returns [`ToolError::InvalidArgs`] if the path has not been read yet
    /// and `require_read_before_write` is enabled.
    pub async fn check_read_before_write(&self, tool_name: &str, path: &Path) -> Result<(), ToolError> {
        if !self.config.require_read_before_write {
            return Ok(());
        }
        if self.read_tracker.has_been_read(path).await {
            return Ok(());
        }
        Err(ToolError::InvalidArgs {
            tool: tool_name.to_string(),
            message: format!(
                "path '{}' must be read with mastra_workspace_read_file before it can be written",
                path.display()
            ),
        })
    }
}

/// Lexically normalize a path (collapsing `.`/`..` without touching the
/// filesystem), so traversal checks work even for paths that don't exist
/// yet, unlike `Path::canonicalize`.
fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }
    result
}
