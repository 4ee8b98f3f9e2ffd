//! Sandbox tools exposed over MCP.
//!
//! Each tool is a thin delegator: it parses its typed arguments, resolves the
//! target through the [`SandboxRegistry`](crate::sandbox::SandboxRegistry),
//! performs one handle operation and shapes the JSON result. All HTTP logic
//! lives in [`crate::sandbox`].

pub mod code;
pub mod command;
pub mod create;
pub mod files;
pub mod kill;
pub mod list;
pub mod urls;

pub use code::RunCodeTool;
pub use command::RunCommandTool;
pub use create::CreateSandboxTool;
pub use files::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use kill::KillSandboxTool;
pub use list::ListSandboxIdsTool;
pub use urls::{GetFileDownloadUrlTool, GetSandboxUrlTool};

/// Tool name constants, in advertised order.
pub const TOOL_CREATE: &str = "create_sandbox";
pub const TOOL_RUN_COMMAND: &str = "run_command";
pub const TOOL_READ_FILE: &str = "read_file";
pub const TOOL_WRITE_FILE: &str = "write_file";
pub const TOOL_LIST_FILES: &str = "list_files";
pub const TOOL_RUN_CODE: &str = "run_code";
pub const TOOL_GET_SANDBOX_URL: &str = "get_sandbox_url";
pub const TOOL_GET_FILE_DOWNLOAD_URL: &str = "get_file_download_url";
pub const TOOL_KILL: &str = "kill_sandbox";
pub const TOOL_LIST_SANDBOX_IDS: &str = "list_sandbox_ids";
