//! URL tools: public port URL and file download URL.

use crate::sandbox::{SandboxError, SandboxRegistry};
use crate::tools::args::{self, GetFileDownloadUrlArgs, GetSandboxUrlArgs};
use crate::tools::error::ToolError;
use crate::tools::traits::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{TOOL_GET_FILE_DOWNLOAD_URL, TOOL_GET_SANDBOX_URL};

// ── get_sandbox_url ─────────────────────────────────────────────────────────

pub struct GetSandboxUrlTool {
    registry: Arc<SandboxRegistry>,
}

impl GetSandboxUrlTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for GetSandboxUrlTool {
    fn name(&self) -> &str {
        TOOL_GET_SANDBOX_URL
    }

    fn description(&self) -> &str {
        "Get the URL for a sandbox on a specific port. \
         Start the server first (e.g. run_command with background=true), then share this URL."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<GetSandboxUrlArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: GetSandboxUrlArgs = args::parse(args, &self.registry.limits())?;
        let port = args.port().map_err(ToolError::InvalidArguments)?;
        let handle = self.registry.get(&args.sandbox_id)?;

        Ok(ToolOutput::new(json!({
            "sandboxId": args.sandbox_id,
            "port": port,
            "url": handle.url(port),
        })))
    }
}

// ── get_file_download_url ───────────────────────────────────────────────────

pub struct GetFileDownloadUrlTool {
    registry: Arc<SandboxRegistry>,
}

impl GetFileDownloadUrlTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for GetFileDownloadUrlTool {
    fn name(&self) -> &str {
        TOOL_GET_FILE_DOWNLOAD_URL
    }

    fn description(&self) -> &str {
        "Get a download URL for a file in the sandbox. \
         Pass useSignatureExpiration (seconds) to make a signed URL expire."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<GetFileDownloadUrlArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: GetFileDownloadUrlArgs = args::parse(args, &self.registry.limits())?;
        let handle = self.registry.get(&args.sandbox_id)?;

        let url = handle
            .download_url(&args.file_path, args.use_signature_expiration)
            .await
            .map_err(|e| SandboxError::remote("get download URL", &args.sandbox_id, e))?;

        Ok(ToolOutput::new(json!({
            "sandboxId": args.sandbox_id,
            "filePath": args.file_path,
            "url": url,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeProvider;
    use crate::sandbox::SandboxLimits;

    fn registry() -> Arc<SandboxRegistry> {
        Arc::new(SandboxRegistry::new(
            Arc::new(FakeProvider::new()),
            SandboxLimits::default(),
        ))
    }

    #[tokio::test]
    async fn sandbox_url_routes_port() {
        let registry = registry();
        let (id, _) = registry.create(None).await.unwrap();
        let out = GetSandboxUrlTool::new(registry)
            .execute(json!({"port": 3000, "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["port"], 3000);
        assert_eq!(out.data["url"], "https://3000-sbx-1.fake.local");
    }

    #[tokio::test]
    async fn sandbox_url_for_unknown_id_is_not_found() {
        let err = GetSandboxUrlTool::new(registry())
            .execute(json!({"port": 3000, "sandboxId": "ghost"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "sandbox_not_found");
    }

    #[tokio::test]
    async fn invalid_port_is_rejected_before_lookup() {
        let err = GetSandboxUrlTool::new(registry())
            .execute(json!({"port": 70000, "sandboxId": "ghost"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_arguments");
    }

    #[tokio::test]
    async fn download_url_passes_expiration() {
        let registry = registry();
        let (id, _) = registry.create(None).await.unwrap();
        let tool = GetFileDownloadUrlTool::new(registry);

        let out = tool
            .execute(json!({"filePath": "/a b.txt", "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["filePath"], "/a b.txt");
        assert_eq!(out.data["url"], "https://fake.local/sbx-1/files?path=%2Fa%20b.txt");

        let out = tool
            .execute(json!({"filePath": "/a", "sandboxId": id, "useSignatureExpiration": 60}))
            .await
            .unwrap();
        assert!(out.data["url"].as_str().unwrap().ends_with("&expires_in=60"));
    }
}
