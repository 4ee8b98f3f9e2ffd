use crate::sandbox::SandboxError;
use serde_json::json;
use thiserror::Error;

/// Every way a tool invocation can fail.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sandbox(e) => e.code(),
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::UnknownTool(_) => "unknown_tool",
        }
    }

    /// Rejected before any sandbox was resolved.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidArguments(_) | Self::UnknownTool(_))
    }

    /// `{"error": {"code": ..., "message": ...}}`
    pub fn to_payload(&self) -> serde_json::Value {
        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}
