//! `list_files` workspace tool: glob-matches files under the workspace root.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::workspace::WorkspaceContext;

/// Handler for `list_files`.
pub struct ListFilesTool {
    ctx: WorkspaceContext,
}

impl ListFilesTool {
    /// Build and register the tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_list_files",
                "List files under the workspace root matching a glob pattern.",
                json!({
                    "type": "object",
                    "properties": { "pattern": { "type": "string" } },
                    "required": ["pattern"],
                }),
            ),
            crate::tool::registry::ToolExecutionPolicy::Auto,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

#[async_trait]
impl ToolHandler for ListFilesTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_list_files", &args)?;
        let pattern = object
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_list_files".to_string(),
                message: "missing required string field 'pattern'".to_string(),
            })?;

        let full_pattern = self.ctx.config.root.join(pattern);
        let full_pattern = full_pattern.to_string_lossy().into_owned();

        let mut matches = Vec::new();
        let paths = glob::glob(&full_pattern).map_err(|err| ToolError::InvalidArgs {
            tool: "mastra_workspace_list_files".to_string(),
            message: err.to_string(),
        })?;
        for entry in paths {
            match entry {
                Ok(path) => matches.push(path.to_string_lossy().into_owned()),
                Err(err) => {
                    return Err(ToolError::ExecutionFailed {
                        tool: "mastra_workspace_list_files".to_string(),
                        message: err.to_string(),
                    })
                }
            }
        }

        Ok(json!({ "paths": matches }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn list_files_matches_glob_pattern() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.rs"), "").await.unwrap();
        tokio::fs::write(dir.path().join("b.txt"), "").await.unwrap();

        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let tool = ListFilesTool { ctx };

        let result = tool.call(json!({"pattern": "*.rs"})).await.unwrap();
        let paths = result["paths"].as_array().unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].as_str().unwrap().ends_with("a.rs"));
    }
}
