//! Typed argument records for every tool.
//!
//! Raw JSON arguments are deserialized into these records and then checked
//! against their range and length constraints. The same records generate the
//! `inputSchema` advertised to clients.

use super::error::ToolError;
use crate::sandbox::registry::{MAX_SANDBOX_TIMEOUT_MS, MIN_SANDBOX_TIMEOUT_MS};
use crate::sandbox::SandboxLimits;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// A validated argument record.
pub trait ToolArgs: DeserializeOwned + JsonSchema {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        Ok(())
    }
}

/// Deserialize and validate `args`. A missing/`null` argument object is
/// treated as `{}`.
pub fn parse<T: ToolArgs>(args: serde_json::Value, limits: &SandboxLimits) -> Result<T, ToolError> {
    let args = if args.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        args
    };
    let parsed: T =
        serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    parsed
        .validate(limits)
        .map_err(ToolError::InvalidArguments)?;
    Ok(parsed)
}

pub fn schema_of<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

fn non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{field} must not be empty"));
    }
    Ok(())
}

/// Create a new sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandboxArgs {
    /// Timeout in milliseconds
    #[schemars(range(min = MIN_SANDBOX_TIMEOUT_MS, max = MAX_SANDBOX_TIMEOUT_MS))]
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ToolArgs for CreateSandboxArgs {
    fn validate(&self, limits: &SandboxLimits) -> Result<(), String> {
        match self.timeout_ms {
            Some(t) if t < MIN_SANDBOX_TIMEOUT_MS || t > limits.max_timeout_ms => Err(format!(
                "timeoutMs must be between {MIN_SANDBOX_TIMEOUT_MS} and {}",
                limits.max_timeout_ms
            )),
            _ => Ok(()),
        }
    }
}

/// Run Python code in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunCodeArgs {
    /// Python code to execute
    #[schemars(length(min = 1))]
    pub code: String,
    /// Optional sandbox ID. If not provided, a temporary sandbox will be created.
    #[serde(default)]
    pub sandbox_id: Option<String>,
}

impl ToolArgs for RunCodeArgs {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        non_empty("code", &self.code)
    }
}

/// Run a shell command in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandArgs {
    /// Shell command to execute
    #[schemars(length(min = 1))]
    pub command: String,
    /// Sandbox ID
    pub sandbox_id: String,
    /// Run command in background
    #[serde(default)]
    pub background: bool,
}

impl ToolArgs for RunCommandArgs {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        non_empty("command", &self.command)
    }
}

/// Read a file from a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileArgs {
    /// Path to the file
    #[schemars(length(min = 1))]
    pub file_path: String,
    /// Sandbox ID
    pub sandbox_id: String,
}

impl ToolArgs for ReadFileArgs {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        non_empty("filePath", &self.file_path)
    }
}

/// Write content to a file in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileArgs {
    /// Path to the file
    #[schemars(length(min = 1))]
    pub file_path: String,
    /// Content to write to the file
    pub file_contents: String,
    /// Sandbox ID
    pub sandbox_id: String,
}

impl ToolArgs for WriteFileArgs {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        non_empty("filePath", &self.file_path)
    }
}

/// List the files in a directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesArgs {
    /// Path to the folder
    #[schemars(length(min = 1))]
    pub folder_path: String,
    /// Sandbox ID
    pub sandbox_id: String,
}

impl ToolArgs for ListFilesArgs {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        non_empty("folderPath", &self.folder_path)
    }
}

/// Get the public URL of a port inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetSandboxUrlArgs {
    /// Port number
    #[schemars(range(min = 1, max = 65535))]
    pub port: i64,
    /// Sandbox ID
    pub sandbox_id: String,
}

impl GetSandboxUrlArgs {
    /// The validated port.
    pub fn port(&self) -> Result<u16, String> {
        u16::try_from(self.port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| "port must be between 1 and 65535".to_string())
    }
}

impl ToolArgs for GetSandboxUrlArgs {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        self.port().map(|_| ())
    }
}

/// Get a download URL for a file in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetFileDownloadUrlArgs {
    /// Path to the file
    #[schemars(length(min = 1))]
    pub file_path: String,
    /// Sandbox ID
    pub sandbox_id: String,
    /// Seconds until a signed URL expires. Omit for a non-expiring URL.
    #[schemars(range(min = 1))]
    #[serde(default)]
    pub use_signature_expiration: Option<u64>,
}

impl ToolArgs for GetFileDownloadUrlArgs {
    fn validate(&self, _limits: &SandboxLimits) -> Result<(), String> {
        non_empty("filePath", &self.file_path)?;
        if self.use_signature_expiration == Some(0) {
            return Err("useSignatureExpiration must be at least 1 second".into());
        }
        Ok(())
    }
}

/// Kill a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KillSandboxArgs {
    /// Sandbox ID
    pub sandbox_id: String,
}

impl ToolArgs for KillSandboxArgs {}

/// List active sandboxes. Takes no arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ListSandboxIdsArgs {}

impl ToolArgs for ListSandboxIdsArgs {}
