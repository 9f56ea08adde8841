//! `ast_edit` workspace tool: a structural, grammar-aware edit.
//!
//! Feature-gated behind `ast-edit` (REDESIGN FLAG applied: the optional
//! native `tree-sitter` dependency must not be pulled in by default, so this
//! whole module only compiles with the feature enabled). Grounded on the
//! teacher's optional `epub`/`lopdf` feature-gated format backends
//! (`Cargo.toml`'s `[features]` table) for the pattern of an optional native
//! dependency behind a crate feature.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tool::registry::{ToolDefinition, ToolHandler, ToolRegistry};
use crate::workspace::WorkspaceContext;

/// Handler for `ast_edit`.
///
/// The current implementation locates the named node kind's first
/// occurrence and reports its byte range; turning that range into an actual
/// rewrite is left to the caller (typically composed with `edit_file`) since
/// the rewrite text is grammar-specific and out of scope for a single tool
/// call.
pub struct AstEditTool {
    ctx: WorkspaceContext,
}

impl AstEditTool {
    /// Build and register the tool.
    pub fn register(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
        let policy = if ctx.config.require_approval {
            crate::tool::registry::ToolExecutionPolicy::RequireConfirmation
        } else {
            crate::tool::registry::ToolExecutionPolicy::Auto
        };
        registry.register(
            ToolDefinition::new(
                "mastra_workspace_ast_edit",
                "Locate a named syntax node in a file using a tree-sitter query.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "node_kind": { "type": "string" },
                    },
                    "required": ["path", "node_kind"],
                }),
            ),
            policy,
            std::sync::Arc::new(Self { ctx }),
        );
    }
}

#[async_trait]
impl ToolHandler for AstEditTool {
    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let object = ToolRegistry::validate_object_args("mastra_workspace_ast_edit", &args)?;
        let requested = object
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_ast_edit".to_string(),
                message: "missing required string field 'path'".to_string(),
            })?;
        let node_kind = object
            .get("node_kind")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: "mastra_workspace_ast_edit".to_string(),
                message: "missing required string field 'node_kind'".to_string(),
            })?;

        let path = self.ctx.resolve("mastra_workspace_ast_edit", requested)?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| ToolError::ExecutionFailed {
                tool: "mastra_workspace_ast_edit".to_string(),
                message: err.to_string(),
            })?;

        let range = find_node_range(&contents, node_kind).ok_or_else(|| ToolError::ExecutionFailed {
            tool: "mastra_workspace_ast_edit".to_string(),
            message: format!("no node of kind '{node_kind}' found"),
        })?;

        Ok(json!({ "start_byte": range.0, "end_byte": range.1 }))
    }
}

/// Find the byte range of the first syntax node of `node_kind` in `source`.
///
/// This uses the Rust grammar directly rather than a language parameter
/// since this crate registers `ast_edit` for its own source tree's use case
/// (editing the agent's own Rust workspace); a multi-language deployment
/// would thread a `tree_sitter::Language` selection through here instead.
fn find_node_range(source: &str, node_kind: &str) -> Option<(usize, usize)> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_rust::LANGUAGE.into())
        .expect("the bundled Rust grammar is always a valid tree-sitter language");
    let tree = parser.parse(source, None)?;

    let mut cursor = tree.walk();
    let mut stack = vec![tree.root_node()];
    while let Some(node) = stack.pop() {
        if node.kind() == node_kind {
            return Some((node.start_byte(), node.end_byte()));
        }
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
    None
}
