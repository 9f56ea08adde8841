//! The individual workspace tool handlers, and a helper to register the
//! full default set onto a [`crate::tool::registry::ToolRegistry`].

pub mod delete;
pub mod edit_file;
pub mod exec;
pub mod grep;
pub mod list_files;
pub mod mkdir;
pub mod read_file;
pub mod write_file;

#[cfg(feature = "ast-edit")]
pub mod ast_edit;

use crate::tool::registry::ToolRegistry;
use crate::workspace::WorkspaceContext;

/// Register every workspace tool (`read_file`, `write_file`, `edit_file`,
/// `list_files`, `delete`, `mkdir`, `grep`, `execute_command`,
/// `get_process_output`, `kill_process`, and, when the `ast-edit` feature is
/// enabled, `ast_edit`) onto `registry`, sharing one [`WorkspaceContext`]
/// across all of them so the write lock, read tracker, and background
/// process table are consistent for the whole run.
pub fn register_all(registry: &mut ToolRegistry, ctx: WorkspaceContext) {
    read_file::ReadFileTool::register(registry, ctx.clone());
    write_file::WriteFileTool::register(registry, ctx.clone());
    edit_file::EditFileTool::register(registry, ctx.clone());
    list_files::ListFilesTool::register(registry, ctx.clone());
    delete::DeleteTool::register(registry, ctx.clone());
    mkdir::MkdirTool::register(registry, ctx.clone());
    grep::GrepTool::register(registry, ctx.clone());
    exec::ExecuteCommandTool::register(registry, ctx.clone());
    exec::GetProcessOutputTool::register(registry, ctx.clone());
    exec::KillProcessTool::register(registry, ctx.clone());

    #[cfg(feature = "ast-edit")]
    ast_edit::AstEditTool::register(registry, ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceConfig;
    use tempfile::tempdir;

    #[test]
    fn register_all_wires_up_every_tool() {
        let dir = tempdir().unwrap();
        let ctx = WorkspaceContext::new(WorkspaceConfig::default().with_root(dir.path()));
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, ctx);

        let names: Vec<_> = registry.tool_specs().into_iter().map(|spec| spec.name).collect();
        assert!(names.contains(&"mastra_workspace_read_file".to_string()));
        assert!(names.contains(&"mastra_workspace_execute_command".to_string()));
    }
}
