//! `mkdir` workspace tool: creates a directory (and its parents).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::workspace::WorkspaceContext;

/// Handler for `mkdir`.
pub struct MkdirTool {
    ctx: WorkspaceContext,
}

impl MkdirTool {
    /// Build and register the tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_mkdir",
                "Create a directory in the workspace, including parent directories.",
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
impl ToolHandler for MkdirTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_mkdir", &args)?;
        let requested = object
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_mkdir".to_string(),
                message: "missing required string field 'path'".to_string(),
            })?;

        let path = self.ctx.resolve("mastra_workspace_mkdir", requested)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|err| ToolError::ExecutionFailed {
                tool: "mastra_workspace_mkdir".to_string(),
                message: err.to_string(),
            })?;

        Ok(json!({ "created": true }))
    }
}
