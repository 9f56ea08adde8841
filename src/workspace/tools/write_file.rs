//! `write_file` workspace tool: overwrites a file, gated by the per-path
//! write lock and read-before-write enforcement (§4.7, §4.7.1).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::workspace::WorkspaceContext;

/// Handler for `write_file`.
pub struct WriteFileTool {
    ctx: WorkspaceContext,
}

impl WriteFileTool {
    /// Build and register the tool. Gated behind
    /// [`ToolExecutionPolicy::RequireConfirmation`] when
    /// `ctx.config.require_approval` is set, matching §4.7's
    /// `requireApproval` flag.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        let policy = if ctx.config.require_approval {
            crate::tool::registry::ToolExecutionPolicy::RequireConfirmation
        } else {
            crate::tool::registry::ToolExecutionPolicy::Auto
        };
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_write_file",
                "Overwrite a file in the workspace with new contents.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "contents": { "type": "string" },
                    },
                    "required": ["path", "contents"],
                }),
            ),
            policy,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_write_file", &args)?;
        let requested = object
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_write_file".to_string(),
                message: "missing required string field 'path'".to_string(),
            })?;
        let contents = object
            .get("contents")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_write_file".to_string(),
                message: "missing required string field 'contents'".to_string(),
            })?;

        let path = self.ctx.resolve("mastra_workspace_write_file", requested)?;

        if path.exists() {
            self.ctx.check_read_before_write("mastra_workspace_write_file", &path).await?;
        }

        let _guard = self.ctx.write_lock.acquire(&path).await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ToolError::ExecutionFailed {
                    tool: "mastra_workspace_write_file".to_string(),
                    message: err.to_string(),
                })?;
        }

        tokio::fs::write(&path, contents)
            .await
            .map_err(|err| ToolError::ExecutionFailed {
                tool: "mastra_workspace_write_file".to_string(),
                message: err.to_string(),
            })?;

        self.ctx.read_tracker.record_read(&path).await;

        Ok(json!({ "written_bytes": contents.len() }))
    }
}
