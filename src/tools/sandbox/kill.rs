//! `kill_sandbox` tool: terminate a tracked sandbox.

use crate::sandbox::SandboxRegistry;
use crate::tools::args::{self, KillSandboxArgs};
use crate::tools::error::ToolError;
use crate::tools::traits::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::TOOL_KILL;

pub struct KillSandboxTool {
    registry: Arc<SandboxRegistry>,
}

impl KillSandboxTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for KillSandboxTool {
    fn name(&self) -> &str {
        TOOL_KILL
    }

    fn description(&self) -> &str {
        "Kill a sandbox. The sandboxId is forgotten even if the remote termination fails."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<KillSandboxArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: KillSandboxArgs = args::parse(args, &self.registry.limits())?;
        self.registry.kill(&args.sandbox_id).await?;

        Ok(ToolOutput::new(json!({
            "sandboxId": args.sandbox_id,
            "message": "Sandbox killed successfully",
            "stats": self.registry.stats(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeProvider;
    use crate::sandbox::SandboxLimits;

    fn setup() -> (Arc<FakeProvider>, Arc<SandboxRegistry>, KillSandboxTool) {
        let provider = Arc::new(FakeProvider::new());
        let registry = Arc::new(SandboxRegistry::new(
            provider.clone(),
            SandboxLimits::default(),
        ));
        (provider, registry.clone(), KillSandboxTool::new(registry))
    }

    #[tokio::test]
    async fn kill_reports_updated_stats() {
        let (_, registry, tool) = setup();
        let (a, _) = registry.create(None).await.unwrap();
        let (b, _) = registry.create(None).await.unwrap();

        let out = tool.execute(json!({"sandboxId": a})).await.unwrap();
        assert_eq!(out.data["message"], "Sandbox killed successfully");
        assert_eq!(out.data["stats"]["active_sandboxes"], 1);
        assert_eq!(out.data["stats"]["sandbox_ids"], json!([b]));
    }

    #[tokio::test]
    async fn second_kill_is_not_found() {
        let (_, registry, tool) = setup();
        let (id, _) = registry.create(None).await.unwrap();
        tool.execute(json!({"sandboxId": id})).await.unwrap();

        let err = tool.execute(json!({"sandboxId": id})).await.unwrap_err();
        assert_eq!(err.code(), "sandbox_not_found");
    }

    #[tokio::test]
    async fn remote_failure_still_forgets_the_id() {
        let (provider, registry, tool) = setup();
        let (id, _) = registry.create(None).await.unwrap();
        provider.fail_kill(true);

        let err = tool.execute(json!({"sandboxId": id})).await.unwrap_err();
        assert_eq!(err.code(), "kill_failed");
        assert!(registry.is_empty());
    }
}
