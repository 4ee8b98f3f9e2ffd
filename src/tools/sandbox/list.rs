//! `list_sandbox_ids` tool.

use crate::sandbox::SandboxRegistry;
use crate::tools::args::{self, ListSandboxIdsArgs};
use crate::tools::error::ToolError;
use crate::tools::traits::{Tool, ToolOutput};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::TOOL_LIST_SANDBOX_IDS;

pub struct ListSandboxIdsTool {
    registry: Arc<SandboxRegistry>,
}

impl ListSandboxIdsTool {
    pub fn new(registry: Arc<SandboxRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ListSandboxIdsTool {
    fn name(&self) -> &str {
        TOOL_LIST_SANDBOX_IDS
    }

    fn description(&self) -> &str {
        "List all active sandbox IDs and statistics"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        args::schema_of::<ListSandboxIdsArgs>()
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let _: ListSandboxIdsArgs = args::parse(args, &self.registry.limits())?;
        let stats = self.registry.stats();
        Ok(ToolOutput::new(json!(stats)))
    }
}
