//! Routes tool invocations by name.
//!
//! The dispatcher owns the fixed tool set and is the only place a raw
//! invocation (name + JSON arguments) turns into a typed [`ToolOutput`] or a
//! classified [`ToolError`].

use super::error::ToolError;
use super::sandbox::{
    CreateSandboxTool, GetFileDownloadUrlTool, GetSandboxUrlTool, KillSandboxTool,
    ListFilesTool, ListSandboxIdsTool, ReadFileTool, RunCodeTool, RunCommandTool, WriteFileTool,
};
use super::traits::{Tool, ToolOutput, ToolSpec};
use crate::sandbox::SandboxRegistry;
use std::sync::Arc;
use std::time::Instant;

pub struct ToolDispatcher {
    registry: Arc<SandboxRegistry>,
    tools: Vec<Box<dyn Tool>>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(CreateSandboxTool::new(registry.clone())),
            Box::new(RunCommandTool::new(registry.clone())),
            Box::new(ReadFileTool::new(registry.clone())),
            Box::new(WriteFileTool::new(registry.clone())),
            Box::new(ListFilesTool::new(registry.clone())),
            Box::new(RunCodeTool::new(registry.clone())),
            Box::new(GetSandboxUrlTool::new(registry.clone())),
            Box::new(GetFileDownloadUrlTool::new(registry.clone())),
            Box::new(KillSandboxTool::new(registry.clone())),
            Box::new(ListSandboxIdsTool::new(registry.clone())),
        ];
        Self { registry, tools }
    }

    pub fn registry(&self) -> &Arc<SandboxRegistry> {
        &self.registry
    }

    /// Advertised tools, in a stable order.
    pub fn definitions(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Execute `name` with `args`.
    pub async fn dispatch(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return Err(ToolError::UnknownTool(name.to_string()));
        };

        tracing::debug!(tool = %name, "dispatching tool call");
        let result = tool.execute(args).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::info!(tool = %name, elapsed_ms, "tool call succeeded"),
            Err(e) if e.is_validation() => {
                tracing::warn!(tool = %name, elapsed_ms, error = %e, "tool call rejected")
            }
            Err(e) => tracing::error!(
                tool = %name,
                elapsed_ms,
                code = e.code(),
                error = %e,
                "tool call failed"
            ),
        }
        result
    }
}
