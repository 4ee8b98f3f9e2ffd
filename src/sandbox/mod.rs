//! Sandbox abstraction layer.
//!
//! Defines the [`SandboxProvider`] / [`SandboxHandle`] trait pair that every
//! remote sandbox backend implements, plus the [`SandboxRegistry`] that owns
//! the handles this process is responsible for. Two providers exist:
//!
//! - [`e2b::E2bProvider`]: E2B cloud MicroVMs (requires `E2B_API_KEY`)
//! - `fake::FakeProvider`: in-memory stand-in for tests, hidden from the docs
//!
//! Tools never talk to a provider directly. Even the one-shot `run_code`
//! path goes through the registry, as a [`TemporarySandbox`].

pub mod e2b;
pub mod error;
#[doc(hidden)]
pub mod fake;
pub mod registry;
pub mod temporary;

pub use error::SandboxError;
pub use registry::{CleanupReport, RegistryStats, SandboxLimits, SandboxRegistry};
pub use temporary::TemporarySandbox;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output from a foreground command executed inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

/// Result of `run_command`: captured output, or the pid of a detached process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Finished(CommandOutput),
    Background { pid: u32 },
}

/// Exception raised by code executed in the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub traceback: String,
}

/// Logs (and optional error) of a `run_code` execution. Output arrives in
/// chunks, which are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeExecution {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Creates remote sandboxes.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Create a sandbox that the remote service will expire after
    /// `timeout_ms` milliseconds.
    async fn create(&self, timeout_ms: u64) -> anyhow::Result<Arc<dyn SandboxHandle>>;
}

/// Operations on one live remote sandbox.
///
/// Remote failures are reported as `anyhow::Error`; callers classify them.
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    /// Identifier assigned by the remote service.
    fn id(&self) -> &str;

    /// Lifetime budget requested at creation, in milliseconds.
    fn timeout_ms(&self) -> u64;

    /// Execute code in the sandbox's interpreter.
    async fn run_code(&self, code: &str) -> anyhow::Result<CodeExecution>;

    /// Run a shell command, either waiting for it or detaching it.
    async fn run_command(&self, command: &str, background: bool)
        -> anyhow::Result<CommandOutcome>;

    /// Read a file and return its content as text.
    async fn read_file(&self, path: &str) -> anyhow::Result<String>;

    /// Write `content` to `path`, creating parent directories.
    async fn write_file(&self, path: &str, content: &[u8]) -> anyhow::Result<()>;

    /// List the entries of a directory, in the order the service reports them.
    async fn list_files(&self, path: &str) -> anyhow::Result<Vec<FileEntry>>;

    /// Public URL routed to `port` inside the sandbox.
    fn url(&self, port: u16) -> String;

    /// URL from which `path` can be downloaded, optionally expiring after
    /// `expires_in_secs`.
    async fn download_url(&self, path: &str, expires_in_secs: Option<u64>)
        -> anyhow::Result<String>;

    /// Terminate the sandbox.
    async fn kill(&self) -> anyhow::Result<()>;
}
