//! `read_file` workspace tool: reads a file and records it for
//! read-before-write enforcement.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::util::truncate::char_limit_sandwich;
use crate::workspace::WorkspaceContext;

/// Handler for `read_file`.
pub struct ReadFileTool {
    ctx: WorkspaceContext,
}

impl ReadFileTool {
    /// Build the tool, its definition, and register it (always `Auto` since
    /// reads are never destructive).
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_read_file",
                "Read the contents of a file in the workspace.",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                }),
            ),
            crate::tool::registry::ToolExecutionPolicy::Auto,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_read_file", &args)?;
        let requested = object
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_read_file".to_string(),
                message: "missing required string field 'path'".to_string(),
            })?;

        let path = self.ctx.resolve("mastra_workspace_read_file", requested)?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| ToolError::ExecutionFailed {
                tool: "mastra_workspace_read_file".to_string(),
                message: err.to_string(),
            })?;

        self.ctx.read_tracker.record_read(&path).await;

        let truncated = char_limit_sandwich(&contents, self.ctx.config.max_output_tokens * 4);
        Ok(json!({ "contents": truncated }))
    }
}
