//! `grep` workspace tool: regex-searches file contents under the workspace
//! root.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::workspace::WorkspaceContext;

/// Handler for `grep`.
pub struct GrepTool {
    ctx: WorkspaceContext,
}

impl GrepTool {
    /// Build and register the tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_grep",
                "Search file contents under the workspace root for a regular expression.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string" },
                        "glob": { "type": "string" },
                    },
                    "required": ["pattern", "glob"],
                }),
            ),
            crate::tool::registry::ToolExecutionPolicy::Auto,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

#[derive(serde::Serialize)]
struct GrepMatch {
    path: String,
    line_number: usize,
    line: String,
}

#[async_trait]
impl ToolHandler for GrepTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_grep", &args)?;
        let pattern = object
            .get("pattern")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_grep".to_string(),
                message: "missing required string field 'pattern'".to_string(),
            })?;
        let glob_pattern = object
            .get("glob")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_grep".to_string(),
                message: "missing required string field 'glob'".to_string(),
            })?;

        let regex = Regex::new(pattern).map_err(|err| ToolError::InvalidArgs {
            tool: "mastra_workspace_grep".to_string(),
            message: format!("invalid regex: {err}"),
        })?;

        let full_pattern = self.ctx.config.root.join(glob_pattern);
        let full_pattern = full_pattern.to_string_lossy().into_owned();

        let mut matches = Vec::new();
        let paths = glob::glob(&full_pattern).map_err(|err| ToolError::InvalidArgs {
            tool: "mastra_workspace_grep".to_string(),
            message: err.to_string(),
        })?;

        for entry in paths {
            let path = entry.map_err(|err| ToolError::ExecutionFailed {
                tool: "mastra_workspace_grep".to_string(),
                message: err.to_string(),
            })?;
            if !path.is_file() {
                continue;
            }
            let Ok(contents) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            for (index, line) in contents.lines().enumerate() {
                if regex.is_match(line) {
                    matches.push(GrepMatch {
                        path: path.to_string_lossy().into_owned(),
                        line_number: index + 1,
                        line: line.to_string(),
                    });
                }
            }
        }

        serde_json::to_value(&matches).map_err(|err| ToolError::ExecutionFailed {
            tool: "mastra_workspace_grep".to_string(),
            message: err.to_string(),
        })
    }
}
