use super::error::ToolError;
use async_trait::async_trait;
use serde::Serialize;

/// Successful tool result: structured data rendered as one text payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub data: serde_json::Value,
}

impl ToolOutput {
    pub fn new(data: serde_json::Value) -> Self {
        Self { data }
    }

    /// Pretty-printed JSON, the form clients receive.
    pub fn text(&self) -> String {
        serde_json::to_string_pretty(&self.data).unwrap_or_else(|_| self.data.to_string())
    }
}

/// Name, description, and input schema advertised to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}
