//! `delete` workspace tool: removes a file, always gated behind
//! confirmation when `require_approval` is set since it is irreversible.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::workspace::WorkspaceContext;

/// Handler for `delete`.
pub struct DeleteTool {
    ctx: WorkspaceContext,
}

impl DeleteTool {
    /// Build and register the tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        let policy = if ctx.config.require_approval {
            crate::tool::registry::ToolExecutionPolicy::RequireConfirmation
        } else {
            crate::tool::registry::ToolExecutionPolicy::Auto
        };
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_delete",
                "Delete a file in the workspace.",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                }),
            ),
            policy,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

#[async_trait]
impl ToolHandler for DeleteTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_delete", &args)?;
        let requested = object
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_delete".to_string(),
                message: "missing required string field 'path'".to_string(),
            })?;

        let path = self.ctx.resolve("mastra_workspace_delete", requested)?;
        let _guard = self.ctx.write_lock.acquire(&path).await;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| ToolError::ExecutionFailed {
                tool: "mastra_workspace_delete".to_string(),
                message: err.to_string(),
            })?;

        Ok(json!({ "deleted": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn delete_removes_the_file() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "x").await.unwrap();

        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let tool = DeleteTool { ctx };
        tool.call(json!({"path": "a.txt"})).await.unwrap();

        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn delete_missing_file_errors() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let tool = DeleteTool { ctx };
        let result = tool.call(json!({"path": "missing.txt"})).await;
        assert!(result.is_err());
    }
}
