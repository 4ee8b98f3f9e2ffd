//! Sandbox file operation tools: read_file, write_file, list_files.

use crate::sandbox::{SandboxError, SandboxRegistry};
use crate::tools::args::{self, ListFilesArgs, ReadFileArgs, WriteFileArgs};
use crate::tools::error::ToolError;
use crate::tools::traits::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{TOOL_LIST_FILES, TOOL_READ_FILE, TOOL_WRITE_FILE};

// ── read_file ───────────────────────────────────────────────────────────────

pub struct ReadFileTool {
    registry: Arc<SandboxRegistry>,
}

impl ReadFileTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_READ_FILE
    }

    fn description(&self) -> &str {
        "Read a file from the sandbox. Returns the file content as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<ReadFileArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: ReadFileArgs = args::parse(args, &self.registry.limits())?;
        let handle = self.registry.get(&args.sandbox_id)?;

        let content = handle
            .read_file(&args.file_path)
            .await
            .map_err(|e| SandboxError::remote("read file", &args.sandbox_id, e))?;

        Ok(ToolOutput::new(json!({
            "filePath": args.file_path,
            "content": content,
            "sandboxId": args.sandbox_id,
        })))
    }
}

// ── write_file ──────────────────────────────────────────────────────────────

pub struct WriteFileTool {
    registry: Arc<SandboxRegistry>,
}

impl WriteFileTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        TOOL_WRITE_FILE
    }

    fn description(&self) -> &str {
        "Write content to a file in the sandbox. \
         Creates parent directories as needed and overwrites an existing file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<WriteFileArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: WriteFileArgs = args::parse(args, &self.registry.limits())?;
        let handle = self.registry.get(&args.sandbox_id)?;

        let bytes = args.file_contents.as_bytes();
        handle
            .write_file(&args.file_path, bytes)
            .await
            .map_err(|e| SandboxError::remote("write file", &args.sandbox_id, e))?;

        tracing::info!(
            sandbox_id = %args.sandbox_id,
            path = %args.file_path,
            bytes = bytes.len(),
            "file written"
        );

        Ok(ToolOutput::new(json!({
            "filePath": args.file_path,
            "message": "File written successfully",
            "sandboxId": args.sandbox_id,
            "size": bytes.len(),
        })))
    }
}

// ── list_files ──────────────────────────────────────────────────────────────

pub struct ListFilesTool {
    registry: Arc<SandboxRegistry>,
}

impl ListFilesTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        TOOL_LIST_FILES
    }

    fn description(&self) -> &str {
        "List files in a directory. Each entry has a name and a type (file or dir)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<ListFilesArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args: ListFilesArgs = args::parse(args, &self.registry.limits())?;
        let handle = self.registry.get(&args.sandbox_id)?;

        let files = handle
            .list_files(&args.folder_path)
            .await
            .map_err(|e| SandboxError::remote("list files", &args.sandbox_id, e))?;

        Ok(ToolOutput::new(json!({
            "folderPath": args.folder_path,
            "count": files.len(),
            "files": files,
            "sandboxId": args.sandbox_id,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeProvider;
    use crate::sandbox::SandboxLimits;

    async fn setup() -> (Arc<SandboxRegistry>, String) {
        let registry = Arc::new(SandboxRegistry::new(
            Arc::new(FakeProvider::new()),
            SandboxLimits::default(),
        ));
        let (id, _) = registry.create(None).await.unwrap();
        (registry, id)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (registry, id) = setup().await;
        let write = WriteFileTool::new(registry.clone());
        let read = ReadFileTool::new(registry);

        let out = write
            .execute(json!({
                "filePath": "/home/user/héllo.txt",
                "fileContents": "héllo",
                "sandboxId": id,
            }))
            .await
            .unwrap();
        assert_eq!(out.data["message"], "File written successfully");
        assert_eq!(out.data["size"], 6);

        let out = read
            .execute(json!({"filePath": "/home/user/héllo.txt", "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["content"], "héllo");
        assert_eq!(out.data["filePath"], "/home/user/héllo.txt");
    }

    #[tokio::test]
    async fn empty_file_has_zero_size() {
        let (registry, id) = setup().await;
        let out = WriteFileTool::new(registry)
            .execute(json!({"filePath": "/e", "fileContents": "", "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["size"], 0);
    }

    #[tokio::test]
    async fn missing_file_is_a_remote_failure() {
        let (registry, id) = setup().await;
        let err = ReadFileTool::new(registry)
            .execute(json!({"filePath": "/nope", "sandboxId": id}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "remote_operation_failed");
        assert!(err.to_string().contains("/nope"));
    }

    #[tokio::test]
    async fn list_counts_entries() {
        let (registry, id) = setup().await;
        let write = WriteFileTool::new(registry.clone());
        for path in ["/w/a.txt", "/w/sub/b.txt"] {
            write
                .execute(json!({"filePath": path, "fileContents": "x", "sandboxId": id}))
                .await
                .unwrap();
        }

        let out = ListFilesTool::new(registry)
            .execute(json!({"folderPath": "/w", "sandboxId": id}))
            .await
            .unwrap();
        assert_eq!(out.data["count"], 2);
        assert_eq!(
            out.data["files"],
            json!([{"name": "a.txt", "type": "file"}, {"name": "sub", "type": "dir"}])
        );
    }

    #[tokio::test]
    async fn names_match_constants() {
        let (registry, _) = setup().await;
        assert_eq!(ReadFileTool::new(registry.clone()).name(), TOOL_READ_FILE);
        assert_eq!(WriteFileTool::new(registry.clone()).name(), TOOL_WRITE_FILE);
        assert_eq!(ListFilesTool::new(registry).name(), TOOL_LIST_FILES);
    }
}
