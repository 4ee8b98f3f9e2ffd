//! E2B sandbox MCP server.
//!
//! Exposes remote E2B sandboxes to MCP clients as ten tools (create, run
//! code, run commands, file I/O, URLs, kill, list). The [`sandbox`] module
//! owns sandbox lifecycle bookkeeping, [`tools`] maps invocations onto it and
//! [`mcp`] speaks JSON-RPC over stdio.

pub mod config;
pub mod mcp;
pub mod sandbox;
pub mod tools;

pub use config::Config;
pub use mcp::McpServer;
pub use sandbox::{SandboxError, SandboxRegistry};
pub use tools::{ToolDispatcher, ToolError};
