//! `ProcessTable`: background-process state for `execute_command`'s
//! background mode and the `get_process_output`/`kill_process` tools
//! (§4.7).
//!
//! A spawned background command is handed off to a dedicated task that owns
//! its `Child` directly rather than behind a shared lock — sharing the
//! `Child` would force whichever task calls `.wait()` to hold the lock for
//! the process's entire lifetime, leaving `kill_process` unable to reach it.
//! Instead the owning task selects between `child.wait()` and a
//! [`tokio::sync::Notify`] kill signal, and publishes stdout/stderr/exit
//! state into a shared [`ProcessEntry`] the rest of the table can read.
//!
//! Grounded on the same registry idiom as [`crate::workspace::lock::FileWriteLock`]
//! and [`crate::workspace::read_tracker::FileReadTracker`]: a `Clone`-able
//! struct wrapping `Arc<Mutex<HashMap<...>>>`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, Notify};

use crate::error::ToolError;
use crate::util::truncate::apply_tail;

/// Number of trailing lines kept for an accumulated background process's
/// stdout/stderr, matching the foreground default (§4.7).
const MAX_ACCUMULATED_LINES: usize = 200;

/// Shared, mutable state for one spawned background process.
struct ProcessEntry {
    stdout: Arc<Mutex<String>>,
    stderr: Arc<Mutex<String>>,
    exit_code: Arc<Mutex<Option<i32>>>,
    kill: Arc<Notify>,
}

/// A registry of live background processes, keyed by PID (the real OS
/// process id, stringified, used as the opaque handle callers pass back to
/// `get_process_output`/`kill_process`).
#[derive(Clone, Default)]
pub struct ProcessTable {
    processes: Arc<Mutex<HashMap<String, ProcessEntry>>>,
}

/// A snapshot of a background process's accumulated output and status.
pub struct ProcessSnapshot {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub running: bool,
}

impl ProcessTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `command` via `sh -c` in `cwd`, returning the PID handle used
    /// to look it up later. stdout/stderr are read line-by-line into
    /// tail-bounded accumulators by two reader tasks; a third task owns the
    /// `Child` and waits for it to exit or for a kill signal.
    pub async fn spawn(&self, command: &str, cwd: &std::path::Path) -> Result<String, ToolError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ToolError::ExecutionFailed {
                tool: "mastra_workspace_execute_command".to_string(),
                message: format!("failed to spawn background command: {err}"),
            })?;

        let pid = child.id().ok_or_else(|| ToolError::ExecutionFailed {
            tool: "mastra_workspace_execute_command".to_string(),
            message: "spawned process has no pid (already exited)".to_string(),
        })?;
        let pid = pid.to_string();

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let exit_code = Arc::new(Mutex::new(None));
        let kill = Arc::new(Notify::new());

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, stdout_buf.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, stderr_buf.clone());
        }

        let exit_code_for_task = exit_code.clone();
        let kill_for_task = kill.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    *exit_code_for_task.lock().await = Some(code.unwrap_or(-1));
                }
                () = kill_for_task.notified() => {
                    let _ = child.start_kill();
                    let status = child.wait().await;
                    let code = status.ok().and_then(|s| s.code());
                    *exit_code_for_task.lock().await = Some(code.unwrap_or(-1));
                }
            }
        });

        self.processes.lock().await.insert(
            pid.clone(),
            ProcessEntry {
                stdout: stdout_buf,
                stderr: stderr_buf,
                exit_code,
                kill,
            },
        );

        Ok(pid)
    }

    /// Read the current accumulated output and status for `pid`. If the
    /// process has exited, its entry is dismissed from the table after this
    /// call returns its final output (§4.7: "PIDs are dismissed after their
    /// exit code is observed").
    pub async fn get_output(&self, pid: &str) -> Result<ProcessSnapshot, ToolError> {
        let snapshot = self.snapshot(pid).await?;
        if !snapshot.running {
            self.processes.lock().await.remove(pid);
        }
        Ok(snapshot)
    }

    /// Send SIGKILL to `pid` and return its last output once the process
    /// has stopped. The entry is dismissed afterward.
    pub async fn kill(&self, pid: &str) -> Result<ProcessSnapshot, ToolError> {
        let entry_kill = {
            let processes = self.processes.lock().await;
            let entry = processes.get(pid).ok_or_else(|| not_found(pid))?;
            entry.kill.clone()
        };
        entry_kill.notify_one();

        // Give the owning task a chance to observe the exit after kill
        // before reporting status; a few short polls avoid a hard sleep.
        for _ in 0..50 {
            let snapshot = self.snapshot(pid).await?;
            if !snapshot.running {
                self.processes.lock().await.remove(pid);
                return Ok(snapshot);
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let snapshot = self.snapshot(pid).await?;
        self.processes.lock().await.remove(pid);
        Ok(snapshot)
    }

    async fn snapshot(&self, pid: &str) -> Result<ProcessSnapshot, ToolError> {
        let processes = self.processes.lock().await;
        let entry = processes.get(pid).ok_or_else(|| not_found(pid))?;
        let stdout = apply_tail(&entry.stdout.lock().await, MAX_ACCUMULATED_LINES);
        let stderr = apply_tail(&entry.stderr.lock().await, MAX_ACCUMULATED_LINES);
        let exit_code = *entry.exit_code.lock().await;
        Ok(ProcessSnapshot {
            stdout,
            stderr,
            exit_code,
            running: exit_code.is_none(),
        })
    }
}

fn not_found(pid: &str) -> ToolError {
    ToolError::InvalidArgs {
        tool: "mastra_workspace_get_process_output".to_string(),
        message: format!("no known background process with pid '{pid}'"),
    }
}

fn spawn_reader<R>(reader: R, buf: Arc<Mutex<String>>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut buf = buf.lock().await;
            buf.push_str(&line);
            buf.push('\n');
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_read_output_of_a_short_command() {
        let table = ProcessTable::new();
        let pid = table.spawn("echo hello", std::path::Path::new(".")).await.unwrap();

        let mut snapshot = table.snapshot(&pid).await.unwrap();
        for _ in 0..50 {
            if !snapshot.running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            snapshot = table.snapshot(&pid).await.unwrap();
        }

        assert!(snapshot.stdout.contains("hello"));
        assert_eq!(snapshot.exit_code, Some(0));
    }

    #[tokio::test]
    async fn get_output_dismisses_the_pid_once_exited() {
        let table = ProcessTable::new();
        let pid = table.spawn("true", std::path::Path::new(".")).await.unwrap();

        let mut snapshot = table.get_output(&pid).await.unwrap();
        for _ in 0..50 {
            if !snapshot.running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            snapshot = table.get_output(&pid).await.unwrap();
        }
        assert!(!snapshot.running);

        let result = table.get_output(&pid).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn kill_stops_a_long_running_process() {
        let table = ProcessTable::new();
        let pid = table.spawn("sleep 30", std::path::Path::new(".")).await.unwrap();

        let snapshot = table.kill(&pid).await.unwrap();
        assert!(!snapshot.running);

        let result = table.get_output(&pid).await;
        assert!(result.is_err());
    }
}
