//! `run_code` tool: execute Python in an existing or throwaway sandbox.

use crate::sandbox::{CodeExecution, SandboxError, SandboxHandle, SandboxRegistry, TemporarySandbox};
use crate::tools::args::{self, RunCodeArgs};
use crate::tools::error::ToolError;
use crate::tools::traits::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::TOOL_RUN_CODE;

pub struct RunCodeTool {
    registry: Arc<SandboxRegistry>,
}

impl RunCodeTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

async fn run(handle: &dyn SandboxHandle, code: &str) -> Result<CodeExecution, SandboxError> {
    let execution = handle
        .run_code(code)
        .await
        .map_err(|e| SandboxError::remote("run code", handle.id(), e))?;
    tracing::info!(
        sandbox_id = %handle.id(),
        stdout_chunks = execution.stdout.len(),
        stderr_chunks = execution.stderr.len(),
        raised = execution.error.is_some(),
        "code execution completed"
    );
    Ok(execution)
}

#[async_trait]
impl Tool for RunCodeTool {
    fn name(&self) -> &str {
        TOOL_RUN_CODE
    }

    fn description(&self) -> &str {
        "Run python code in a secure sandbox by E2B. Using the Jupyter Notebook syntax. \
         Optionally specify sandboxId to use an existing sandbox; otherwise a temporary \
         sandbox is created for this call and killed afterwards."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<RunCodeArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: RunCodeArgs = args::parse(args, &self.registry.limits())?;

        let (execution, origin) = match args.sandbox_id {
            Some(sandbox_id) => {
                let handle = self.registry.get(&sandbox_id)?;
                tracing::info!(sandbox_id = %sandbox_id, "running code in existing sandbox");
                let execution = run(handle.as_ref(), &args.code).await?;
                (execution, json!({ "sandboxId": sandbox_id }))
            }
            None => {
                let sandbox = TemporarySandbox::create(&self.registry).await?;
                tracing::info!(sandbox_id = %sandbox.id(), "running code in temporary sandbox");

                let result = run(sandbox.handle(), &args.code).await;
                sandbox.release().await;
                (result?, json!({ "message": "Executed in temporary sandbox" }))
            }
        };

        let mut data = json!({
            "stdout": execution.stdout,
            "stderr": execution.stderr,
        });
        if let Some(error) = execution.error {
            data["error"] = json!(error);
        }
        if let (Some(data), Some(origin)) = (data.as_object_mut(), origin.as_object()) {
            data.extend(origin.clone());
        }
        Ok(ToolOutput::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeProvider;
    use crate::sandbox::SandboxLimits;

    fn setup() -> (Arc<FakeProvider>, Arc<SandboxRegistry>, RunCodeTool) {
        let provider = Arc::new(FakeProvider::new());
        let registry = Arc::new(SandboxRegistry::new(
            provider.clone(),
            SandboxLimits::default(),
        ));
        let tool = RunCodeTool::new(registry.clone());
        (provider, registry, tool)
    }

    #[tokio::test]
    async fn temporary_sandbox_is_killed_after_success() {
        let (provider, registry, tool) = setup();
        let out = tool.execute(json!({"code": "print(1)"})).await.unwrap();

        assert_eq!(out.data["message"], "Executed in temporary sandbox");
        assert_eq!(out.data["stdout"], json!(["print(1)\n"]));
        assert!(out.data.get("sandboxId").is_none());
        assert_eq!(provider.kills(), vec!["sbx-1".to_string()]);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn temporary_sandbox_is_killed_after_failure() {
        let (provider, _, tool) = setup();
        provider.fail_code(true);
        let err = tool.execute(json!({"code": "print(1)"})).await.unwrap_err();

        assert_eq!(err.code(), "remote_operation_failed");
        assert_eq!(provider.kills(), vec!["sbx-1".to_string()]);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_mask_result() {
        let (provider, _, tool) = setup();
        provider.fail_kill(true);
        let out = tool.execute(json!({"code": "x = 1"})).await.unwrap();
        assert_eq!(out.data["stdout"], json!(["x = 1\n"]));
        assert_eq!(provider.kills().len(), 1);
    }

    #[tokio::test]
    async fn temporary_sandbox_bypasses_capacity() {
        let provider = Arc::new(FakeProvider::new());
        let registry = Arc::new(SandboxRegistry::new(
            provider.clone(),
            SandboxLimits {
                max_sandboxes: 1,
                ..SandboxLimits::default()
            },
        ));
        registry.create(None).await.unwrap();

        let tool = RunCodeTool::new(registry.clone());
        tool.execute(json!({"code": "1 + 1"})).await.unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn existing_sandbox_is_reported_and_kept() {
        let (provider, registry, tool) = setup();
        let (id, _) = registry.create(None).await.unwrap();

        let out = tool
            .execute(json!({"code": "raise ValueError()", "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["sandboxId"], id.as_str());
        assert_eq!(out.data["error"]["name"], "Exception");
        assert!(provider.kills().is_empty());
        assert!(registry.get(&id).is_ok());
    }

    #[tokio::test]
    async fn unknown_sandbox_is_not_found_without_creating() {
        let (provider, _, tool) = setup();
        let err = tool
            .execute(json!({"code": "print(1)", "sandboxId": "nope"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "sandbox_not_found");
        assert_eq!(provider.create_calls(), 0);
    }

    #[tokio::test]
    async fn temporary_create_failure_is_create_failed() {
        let (provider, _, tool) = setup();
        provider.fail_create(true);
        let err = tool.execute(json!({"code": "print(1)"})).await.unwrap_err();
        assert_eq!(err.code(), "create_failed");
        assert!(provider.kills().is_empty());
    }
}
