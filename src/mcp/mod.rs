//! Model Context Protocol surface: JSON-RPC 2.0 over newline-delimited stdio.

pub mod protocol;
pub mod server;

pub use server::{McpServer, ServerError};
