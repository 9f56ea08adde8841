//! `execute_command` / `get_process_output` / `kill_process` workspace
//! tools: run a shell command rooted at the workspace directory, capturing
//! and truncating its output (§4.7, §5).
//!
//! Grounded on the teacher's `tools/visit_webpage.rs`-style external-process
//! boundary (treated as untrusted, output always captured rather than
//! inherited) and the concurrency/resource model in spec §5 (commands run
//! under `tokio::process::Command` so they participate in the same async
//! cancellation the rest of the loop uses). Background-mode state lives in
//! [`crate::workspace::process_table::ProcessTable`].

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::util::truncate::{apply_tail, char_limit_sandwich};
use crate::workspace::WorkspaceContext;

/// Handler for `execute_command`.
pub struct ExecuteCommandTool {
    ctx: WorkspaceContext,
}

impl ExecuteCommandTool {
    /// Build and register the tool, always gated behind confirmation when
    /// `require_approval` is set — arbitrary command execution is the most
    /// dangerous workspace tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        let policy = exec_policy(&ctx);
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_execute_command",
                "Run a shell command in the workspace root and capture its output. \
                 Pass background=true to run it detached and get back a pid handle \
                 usable with get_process_output/kill_process.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": { "type": "string" },
                        "timeout_seconds": { "type": "integer" },
                        "background": { "type": "boolean" },
                    },
                    "required": ["command"],
                }),
            ),
            policy,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

/// Handler for `get_process_output`.
pub struct GetProcessOutputTool {
    ctx: WorkspaceContext,
}

impl GetProcessOutputTool {
    /// Build and register the tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_get_process_output",
                "Read the accumulated stdout/stderr and status of a background process \
                 started with execute_command(background=true).",
                json!({
                    "type": "object",
                    "properties": { "pid": { "type": "string" } },
                    "required": ["pid"],
                }),
            ),
            crate::tool::registry::ToolExecutionPolicy::Auto,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

/// Handler for `kill_process`.
pub struct KillProcessTool {
    ctx: WorkspaceContext,
}

impl KillProcessTool {
    /// Build and register the tool, gated behind confirmation alongside
    /// `execute_command` since it terminates a process.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        let policy = exec_policy(&ctx);
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_kill_process",
                "Send SIGKILL to a background process started with execute_command(background=true) \
                 and return its last output.",
                json!({
                    "type": "object",
                    "properties": { "pid": { "type": "string" } },
                    "required": ["pid"],
                }),
            ),
            policy,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

fn exec_policy(ctx: &WorkspaceContext) -> crate::tool::registry::ToolExecutionPolicy {
    if ctx.config.require_approval {
        crate::tool::registry::ToolExecutionPolicy::RequireConfirmation
    } else {
        crate::tool::registry::ToolExecutionPolicy::Auto
    }
}

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Default output tail, per §4.7: "default last 200 lines, hard-cap 30 KB".
const MAX_OUTPUT_LINES: usize = 200;
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Matches a trailing `| tail -N` or `| tail -n N` pipe segment so it can be
/// stripped and applied in-process instead of shelling out to `tail`
/// (§4.7: foreground only; background mode preserves the pipe as written).
fn trailing_tail_pipe() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\|\s*tail\s+(?:-n\s*|-)(\d+)\s*$").expect("static regex is valid"))
}

/// Strip a trailing `| tail [-n] N` from `command`, returning the stripped
/// command and the requested line count if one was found.
fn strip_trailing_tail(command: &str) -> (&str, Option<usize>) {
    match trailing_tail_pipe().captures(command) {
        Some(caps) => {
            let n: usize = caps[1].parse().unwrap_or(MAX_OUTPUT_LINES);
            let end = caps.get(0).expect("capture 0 always present").start();
            (command[..end].trim_end(), Some(n))
        }
        None => (command, None),
    }
}

fn truncate_output(text: &str, max_lines: usize) -> String {
    char_limit_sandwich(&apply_tail(text, max_lines), MAX_OUTPUT_CHARS)
}

#[async_trait]
impl ToolHandler for ExecuteCommandTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_execute_command", &args)?;
        let command = object
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_execute_command".to_string(),
                message: "missing required string field 'command'".to_string(),
            })?;
        let timeout_seconds = object
            .get("timeout_seconds")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let background = object
            .get("background")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if background {
            let pid = self
                .ctx
                .process_table
                .spawn(command, &self.ctx.config.root)
                .await?;
            return Ok(json!({ "pid": pid, "background": true }));
        }

        let (command, tail_override) = strip_trailing_tail(command);
        let max_lines = tail_override.unwrap_or(MAX_OUTPUT_LINES);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.ctx.config.root)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(timeout_seconds),
            &mut child,
        )
        .await
        .map_err(|_| ToolError::ExecutionFailed {
            tool: "mastra_workspace_execute_command".to_string(),
            message: format!("command timed out after {timeout_seconds}s"),
        })?
        .map_err(|err| ToolError::ExecutionFailed {
            tool: "mastra_workspace_execute_command".to_string(),
            message: err.to_string(),
        })?;

        let stdout = truncate_output(&String::from_utf8_lossy(&output.stdout), max_lines);
        let stderr = truncate_output(&String::from_utf8_lossy(&output.stderr), max_lines);

        Ok(json!({
            "exit_code": output.status.code(),
            "stdout": stdout,
            "stderr": stderr,
        }))
    }
}

#[async_trait]
impl ToolHandler for GetProcessOutputTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_get_process_output", &args)?;
        let pid = object
            .get("pid")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_get_process_output".to_string(),
                message: "missing required string field 'pid'".to_string(),
            })?;

        let snapshot = self.ctx.process_table.get_output(pid).await?;
        Ok(json!({
            "pid": pid,
            "stdout": char_limit_sandwich(&snapshot.stdout, MAX_OUTPUT_CHARS),
            "stderr": char_limit_sandwich(&snapshot.stderr, MAX_OUTPUT_CHARS),
            "exit_code": snapshot.exit_code,
            "running": snapshot.running,
        }))
    }
}

#[async_trait]
impl ToolHandler for KillProcessTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_kill_process", &args)?;
        let pid = object
            .get("pid")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_kill_process".to_string(),
                message: "missing required string field 'pid'".to_string(),
            })?;

        let snapshot = self.ctx.process_table.kill(pid).await?;
        Ok(json!({
            "pid": pid,
            "stdout": char_limit_sandwich(&snapshot.stdout, MAX_OUTPUT_CHARS),
            "stderr": char_limit_sandwich(&snapshot.stderr, MAX_OUTPUT_CHARS),
            "exit_code": snapshot.exit_code,
            "running": snapshot.running,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn execute_command_captures_stdout() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let tool = ExecuteCommandTool { ctx };

        let result = tool.call(json!({"command": "echo hello"})).await.unwrap();
        assert_eq!(result["exit_code"], 0);
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn execute_command_reports_nonzero_exit() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let tool = ExecuteCommandTool { ctx };

        let result = tool.call(json!({"command": "exit 3"})).await.unwrap();
        assert_eq!(result["exit_code"], 3);
    }

    #[tokio::test]
    async fn execute_command_strips_and_applies_trailing_tail_pipe() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let tool = ExecuteCommandTool { ctx };

        let result = tool
            .call(json!({"command": "printf 'a\\nb\\nc\\nd\\n' | tail -n 2"}))
            .await
            .unwrap();
        let stdout = result["stdout"].as_str().unwrap();
        assert_eq!(stdout.trim(), "c\nd");
    }

    #[tokio::test]
    async fn background_execute_then_get_output_then_dismissed() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let exec_tool = ExecuteCommandTool { ctx: ctx.clone() };
        let output_tool = GetProcessOutputTool { ctx: ctx.clone() };

        let spawned = exec_tool
            .call(json!({"command": "echo bg-hello", "background": true}))
            .await
            .unwrap();
        assert_eq!(spawned["background"], true);
        let pid = spawned["pid"].as_str().unwrap().to_string();

        let mut snapshot = output_tool.call(json!({"pid": pid})).await.unwrap();
        for _ in 0..50 {
            if snapshot["running"] == false {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            snapshot = output_tool.call(json!({"pid": pid})).await.unwrap();
        }
        assert!(snapshot["stdout"].as_str().unwrap().contains("bg-hello"));
        assert_eq!(snapshot["exit_code"], 0);

        let result = output_tool.call(json!({"pid": pid})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn kill_process_stops_a_background_command() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let exec_tool = ExecuteCommandTool { ctx: ctx.clone() };
        let kill_tool = KillProcessTool { ctx: ctx.clone() };

        let spawned = exec_tool
            .call(json!({"command": "sleep 30", "background": true}))
            .await
            .unwrap();
        let pid = spawned["pid"].as_str().unwrap().to_string();

        let result = kill_tool.call(json!({"pid": pid})).await.unwrap();
        assert_eq!(result["running"], false);
    }
}
