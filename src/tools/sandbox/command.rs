//! `run_command` tool: execute a shell command in a tracked sandbox.

use crate::sandbox::{CommandOutcome, SandboxError, SandboxRegistry};
use crate::tools::args::{self, RunCommandArgs};
use crate::tools::error::ToolError;
use crate::tools::traits::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::TOOL_RUN_COMMAND;

pub struct RunCommandTool {
    registry: Arc<SandboxRegistry>,
}

impl RunCommandTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        TOOL_RUN_COMMAND
    }

    fn description(&self) -> &str {
        "Run a command in the sandbox. \
         Returns stdout, stderr, and exit_code. A non-zero exit code is reported, not treated as a failure. \
         With background=true the command is detached and only its pid is returned."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<RunCommandArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: RunCommandArgs = args::parse(args, &self.registry.limits())?;
        let handle = self.registry.get(&args.sandbox_id)?;

        tracing::info!(
            sandbox_id = %args.sandbox_id,
            background = args.background,
            "running command"
        );

        let outcome = handle
            .run_command(&args.command, args.background)
            .await
            .map_err(|e| SandboxError::remote("run command", &args.sandbox_id, e))?;

        let data = match outcome {
            CommandOutcome::Finished(output) => json!({
                "stdout": output.stdout,
                "stderr": output.stderr,
                "exit_code": output.exit_code,
                "sandboxId": args.sandbox_id,
            }),
            CommandOutcome::Background { pid } => json!({
                "message": "Command started in background",
                "pid": pid,
                "sandboxId": args.sandbox_id,
            }),
        };
        Ok(ToolOutput::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeProvider;
    use crate::sandbox::SandboxLimits;

    async fn setup() -> (Arc<SandboxRegistry>, RunCommandTool, String) {
        let registry = Arc::new(SandboxRegistry::new(
            Arc::new(FakeProvider::new()),
            SandboxLimits::default(),
        ));
        let (id, _) = registry.create(None).await.unwrap();
        (registry.clone(), RunCommandTool::new(registry), id)
    }

    #[tokio::test]
    async fn tool_name() {
        let (_, tool, _) = setup().await;
        assert_eq!(tool.name(), TOOL_RUN_COMMAND);
    }

    #[tokio::test]
    async fn foreground_reports_output() {
        let (_, tool, id) = setup().await;
        let out = tool
            .execute(json!({"command": "ls -la", "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["exit_code"], 0);
        assert_eq!(out.data["sandboxId"], id.as_str());
        assert!(out.data["stdout"].is_string());
    }

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let (_, tool, id) = setup().await;
        let out = tool
            .execute(json!({"command": "false", "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["exit_code"], 1);
    }

    #[tokio::test]
    async fn background_returns_pid() {
        let (_, tool, id) = setup().await;
        let out = tool
            .execute(json!({"command": "sleep 100", "sandboxId": id, "background": true}))
            .await
            .unwrap();
        assert_eq!(out.data["message"], "Command started in background");
        assert!(out.data["pid"].is_u64());
        assert!(out.data.get("stdout").is_none());
    }

    #[tokio::test]
    async fn unknown_sandbox_is_not_found() {
        let (_, tool, _) = setup().await;
        let err = tool
            .execute(json!({"command": "ls", "sandboxId": "missing"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "sandbox_not_found");
    }
}
