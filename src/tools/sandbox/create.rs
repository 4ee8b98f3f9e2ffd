//! `create_sandbox` tool: create a tracked sandbox.

use crate::sandbox::SandboxRegistry;
use crate::tools::args::{self, CreateSandboxArgs};
use crate::tools::error::ToolError;
use crate::tools::traits::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::TOOL_CREATE;

pub struct CreateSandboxTool {
    registry: Arc<SandboxRegistry>,
}

impl CreateSandboxTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for CreateSandboxTool {
    fn name(&self) -> &str {
        TOOL_CREATE
    }

    fn description(&self) -> &str {
        "Create a new E2B sandbox. Returns the sandboxId that all other sandbox tools \
         take as input. The sandbox expires after timeoutMs (default 5 minutes, max 1 hour) \
         unless killed earlier with kill_sandbox."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<CreateSandboxArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: CreateSandboxArgs = args::parse(args, &self.registry.limits())?;

        let (sandbox_id, handle) = self.registry.create(args.timeout_ms).await?;
        let timeout_ms = handle.timeout_ms();

        Ok(ToolOutput::new(json!({
            "sandboxId": sandbox_id,
            "timeoutMs": timeout_ms,
            "message": format!("Sandbox created successfully with timeout {timeout_ms}ms"),
            "stats": self.registry.stats(),
        })))
    }
}
