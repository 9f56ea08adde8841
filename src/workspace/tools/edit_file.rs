//! `edit_file` workspace tool: a find-and-replace edit, gated the same way
//! as `write_file` (§4.7).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::workspace::WorkspaceContext;

/// Handler for `edit_file`.
pub struct EditFileTool {
    ctx: WorkspaceContext,
}

impl EditFileTool {
    /// Build and register the tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        let policy = if ctx.config.require_approval {
            crate::tool::registry::ToolExecutionPolicy::RequireConfirmation
        } else {
            crate::tool::registry::ToolExecutionPolicy::Auto
        };
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_edit_file",
                "Replace an exact-match substring in a file. By default `old_string` must \
                 occur exactly once; set `replace_all` to replace every occurrence instead.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "old_string": { "type": "string" },
                        "new_string": { "type": "string" },
                        "replace_all": { "type": "boolean" },
                    },
                    "required": ["path", "old_string", "new_string"],
                }),
            ),
            policy,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

#[async_trait]
impl ToolHandler for EditFileTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_edit_file", &args)?;
        let requested = field_str(object, "path")?;
        let old_string = field_str(object, "old_string")?;
        let new_string = field_str(object, "new_string")?;
        let replace_all = object.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        if old_string.is_empty() {
            return Err(ToolError::InvalidArgs {
                tool: "mastra_workspace_edit_file".to_string(),
                message: "'old_string' must not be empty".to_string(),
            });
        }

        let path = self.ctx.resolve("mastra_workspace_edit_file", requested)?;
        self.ctx.check_read_before_write("mastra_workspace_edit_file", &path).await?;

        // §4.7.1: serialize edits to the same path FIFO so two concurrent
        // fan-out tool calls don't interleave reads and writes.
        self.ctx
            .write_lock
            .with_lock(&path, || async {
                let contents =
                    tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|err| ToolError::ExecutionFailed {
                            tool: "mastra_workspace_edit_file".to_string(),
                            message: err.to_string(),
                        })?;

                let occurrences = contents.matches(old_string).count();
                if occurrences == 0 {
                    return Err(ToolError::ExecutionFailed {
                        tool: "mastra_workspace_edit_file".to_string(),
                        message: format!("'{old_string}' not found in {}", path.display()),
                    });
                }
                if occurrences > 1 && !replace_all {
                    return Err(ToolError::ExecutionFailed {
                        tool: "mastra_workspace_edit_file".to_string(),
                        message: format!(
                            "'{old_string}' occurs {occurrences} times in {}; pass replace_all to replace every occurrence",
                            path.display()
                        ),
                    });
                }

                let updated = if replace_all {
                    contents.replace(old_string, new_string)
                } else {
                    contents.replacen(old_string, new_string, 1)
                };

                tokio::fs::write(&path, &updated)
                    .await
                    .map_err(|err| ToolError::ExecutionFailed {
                        tool: "mastra_workspace_edit_file".to_string(),
                        message: err.to_string(),
                    })?;

                Ok(json!({ "message": format!("Replaced {occurrences} occurrence(s)") }))
            })
            .await
    }
}

fn field_str<'a>(object: &'a serde_json::Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    object
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArgs {
            tool: "mastra_workspace_edit_file".to_string(),
            message: format!("missing required string field '{name}'"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn edit_file_replaces_unique_occurrence() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "foo bar baz").await.unwrap();

        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let resolved = ctx.resolve("mastra_workspace_edit_file", "a.txt").unwrap();
        ctx.read_tracker.record_read(&resolved).await;

        let tool = EditFileTool { ctx };
        let result = tool
            .call(json!({"path": "a.txt", "old_string": "foo", "new_string": "qux"}))
            .await
            .unwrap();
        assert_eq!(result["message"], "Replaced 1 occurrence(s)");

        let updated = tokio::fs::read_to_string(dir.path().join("a.txt")).await.unwrap();
        assert_eq!(updated, "qux bar baz");
    }

    #[tokio::test]
    async fn edit_file_errors_when_pattern_missing() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "hello").await.unwrap();

        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let resolved = ctx.resolve("mastra_workspace_edit_file", "a.txt").unwrap();
        ctx.read_tracker.record_read(&resolved).await;

        let tool = EditFileTool { ctx };
        let result = tool
            .call(json!({"path": "a.txt", "old_string": "missing", "new_string": "x"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn edit_file_rejects_ambiguous_match_without_replace_all() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "foo bar foo").await.unwrap();

        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let resolved = ctx.resolve("mastra_workspace_edit_file", "a.txt").unwrap();
        ctx.read_tracker.record_read(&resolved).await;

        let tool = EditFileTool { ctx };
        let result = tool
            .call(json!({"path": "a.txt", "old_string": "foo", "new_string": "baz"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn edit_file_replace_all_rewrites_every_occurrence() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), "foo bar foo").await.unwrap();

        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let resolved = ctx.resolve("mastra_workspace_edit_file", "a.txt").unwrap();
        ctx.read_tracker.record_read(&resolved).await;

        let tool = EditFileTool { ctx };
        let result = tool
            .call(json!({"path": "a.txt", "old_string": "foo", "new_string": "baz", "replace_all": true}))
            .await
            .unwrap();
        assert_eq!(result["message"], "Replaced 2 occurrence(s)");

        let updated = tokio::fs::read_to_string(dir.path().join("a.txt")).await.unwrap();
        assert_eq!(updated, "baz bar baz");
    }
}
