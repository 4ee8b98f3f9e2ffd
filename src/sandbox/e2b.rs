//! E2B sandbox provider: HTTP client for the E2B REST API.
//!
//! One [`E2bProvider`] owns a shared `reqwest::Client`; every sandbox it
//! creates gets an [`E2bSandbox`] handle that reuses that client. Public host
//! and download URLs are derived locally from the sandbox id and domain, the
//! same way the E2B SDKs do it.

use super::{
    CodeExecution, CommandOutcome, CommandOutput, ExecutionError, FileEntry, FileKind,
    SandboxHandle, SandboxProvider,
};
use crate::config::E2bConfig;
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Base URL for the E2B REST API.
pub const E2B_API_BASE: &str = "https://api.e2b.dev";
/// Domain under which sandbox hosts are exposed.
pub const E2B_DOMAIN: &str = "e2b.app";
/// Template with the Jupyter-based code interpreter preinstalled.
pub const DEFAULT_TEMPLATE: &str = "code-interpreter-v1";
/// Port of the in-sandbox daemon that serves file downloads.
pub const ENVD_PORT: u16 = 49983;

/// Default user inside E2B sandboxes.
const SANDBOX_USER: &str = "user";

struct E2bApi {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl E2bApi {
    fn sandboxes_url(&self) -> String {
        format!("{}/v0/sandboxes", self.api_base.trim_end_matches('/'))
    }

    fn sandbox_url(&self, sandbox_id: &str, suffix: &str) -> String {
        format!("{}/{sandbox_id}{suffix}", self.sandboxes_url())
    }

    /// Send an authenticated request and return the status with the body text.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> anyhow::Result<(reqwest::StatusCode, String)> {
        let resp = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("E2B {operation} request failed: {e}"))?;

        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".to_string());
        Ok((status, body_text))
    }

    /// Like [`Self::send`], but any non-2xx status is an error.
    async fn send_ok(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> anyhow::Result<String> {
        let (status, body_text) = self.send(request, operation).await?;
        anyhow::ensure!(
            status.is_success(),
            "E2B API returned {status}: {body_text}"
        );
        Ok(body_text)
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body_text: &str) -> anyhow::Result<T> {
    serde_json::from_str(body_text)
        .map_err(|e| anyhow::anyhow!("Failed to parse E2B response: {e}\nBody: {body_text}"))
}

/// Creates sandboxes through the E2B control plane.
pub struct E2bProvider {
    api: Arc<E2bApi>,
    domain: String,
    template: String,
}

impl E2bProvider {
    pub fn new(config: &E2bConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("e2b-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            api: Arc::new(E2bApi {
                http,
                api_key: config.api_key.clone(),
                api_base: config.api_base.clone(),
            }),
            domain: config.domain.clone(),
            template: config.template.clone(),
        })
    }
}

#[derive(Deserialize)]
struct CreatedSandbox {
    #[serde(rename = "sandboxID", alias = "sandbox_id", default)]
    sandbox_id: String,
    #[serde(rename = "envdAccessToken", default)]
    envd_access_token: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

#[async_trait]
impl SandboxProvider for E2bProvider {
    async fn create(&self, timeout_ms: u64) -> anyhow::Result<Arc<dyn SandboxHandle>> {
        anyhow::ensure!(!self.api.api_key.is_empty(), "E2B_API_KEY is not set");

        let body = serde_json::json!({
            "templateID": self.template,
            "timeout": timeout_ms.div_ceil(1000).max(1),
        });
        let request = self.api.http.post(self.api.sandboxes_url()).json(&body);
        let body_text = self.api.send_ok(request, "create sandbox").await?;

        let created: CreatedSandbox = parse_body(&body_text)?;
        anyhow::ensure!(
            !created.sandbox_id.is_empty(),
            "E2B returned no sandbox_id. Response: {body_text}"
        );

        Ok(Arc::new(E2bSandbox {
            id: created.sandbox_id,
            timeout_ms,
            access_token: created.envd_access_token,
            domain: created.domain.unwrap_or_else(|| self.domain.clone()),
            api: Arc::clone(&self.api),
        }))
    }
}

/// Handle to one E2B sandbox.
pub struct E2bSandbox {
    id: String,
    timeout_ms: u64,
    access_token: Option<String>,
    domain: String,
    api: Arc<E2bApi>,
}

#[derive(Deserialize, Default)]
struct ExecutionLogs {
    #[serde(default)]
    stdout: Vec<String>,
    #[serde(default)]
    stderr: Vec<String>,
}

#[derive(Deserialize)]
struct CodeResponse {
    #[serde(default)]
    logs: ExecutionLogs,
    #[serde(default)]
    error: Option<ExecutionError>,
}

#[derive(Deserialize)]
struct CommandResponse {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(rename = "exitCode", alias = "exit_code", default)]
    exit_code: Option<i64>,
    #[serde(default)]
    pid: Option<u32>,
}

#[derive(Deserialize)]
struct ListedEntry {
    name: String,
    #[serde(rename = "type", default)]
    entry_type: String,
}

impl E2bSandbox {
    fn host(&self, port: u16) -> String {
        format!("{port}-{}.{}", self.id, self.domain)
    }

    fn files_url(&self, suffix: &str, path: &str) -> String {
        format!(
            "{}?path={encoded}",
            self.api.sandbox_url(&self.id, suffix),
            encoded = urlencoding::encode(path)
        )
    }

    /// `v1_` + unpadded base64 of `sha256(path:operation:user:token[:expiration])`.
    fn signature(
        path: &str,
        operation: &str,
        user: &str,
        access_token: &str,
        expiration: Option<i64>,
    ) -> String {
        let mut raw = format!("{path}:{operation}:{user}:{access_token}");
        if let Some(expiration) = expiration {
            raw.push_str(&format!(":{expiration}"));
        }
        let digest = Sha256::digest(raw.as_bytes());
        format!(
            "v1_{}",
            base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest)
        )
    }
}

#[async_trait]
impl SandboxHandle for E2bSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    async fn run_code(&self, code: &str) -> anyhow::Result<CodeExecution> {
        let request = self
            .api
            .http
            .post(self.api.sandbox_url(&self.id, "/code"))
            .json(&serde_json::json!({ "code": code }));
        let body_text = self.api.send_ok(request, "run_code").await?;

        let parsed: CodeResponse = parse_body(&body_text)?;
        Ok(CodeExecution {
            stdout: parsed.logs.stdout,
            stderr: parsed.logs.stderr,
            error: parsed.error,
        })
    }

    async fn run_command(
        &self,
        command: &str,
        background: bool,
    ) -> anyhow::Result<CommandOutcome> {
        let request = self
            .api
            .http
            .post(self.api.sandbox_url(&self.id, "/commands"))
            .json(&serde_json::json!({
                "cmd": command,
                "background": background,
            }));
        let body_text = self.api.send_ok(request, "run_command").await?;

        let parsed: CommandResponse = parse_body(&body_text)?;
        if background {
            let pid = parsed
                .pid
                .ok_or_else(|| anyhow::anyhow!("E2B returned no pid. Response: {body_text}"))?;
            return Ok(CommandOutcome::Background { pid });
        }

        Ok(CommandOutcome::Finished(CommandOutput {
            stdout: parsed.stdout,
            stderr: parsed.stderr,
            exit_code: parsed.exit_code.unwrap_or(0),
        }))
    }

    async fn read_file(&self, path: &str) -> anyhow::Result<String> {
        let request = self.api.http.get(self.files_url("/files", path));
        let (status, body_text) = self.api.send(request, "read_file").await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("File not found: {path}");
        }
        anyhow::ensure!(
            status.is_success(),
            "E2B API returned {status}: {body_text}"
        );
        Ok(body_text)
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> anyhow::Result<()> {
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("path", path.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(content.to_vec())
                    .file_name(file_name)
                    .mime_str("application/octet-stream")
                    .map_err(|e| anyhow::anyhow!("MIME type error: {e}"))?,
            );

        let request = self
            .api
            .http
            .post(self.api.sandbox_url(&self.id, "/files"))
            .multipart(form);
        self.api.send_ok(request, "write_file").await?;
        Ok(())
    }

    async fn list_files(&self, path: &str) -> anyhow::Result<Vec<FileEntry>> {
        let request = self.api.http.get(self.files_url("/files/list", path));
        let body_text = self.api.send_ok(request, "list_files").await?;

        let entries: Vec<ListedEntry> = parse_body(&body_text)?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let kind = match entry.entry_type.as_str() {
                    "dir" | "directory" => FileKind::Dir,
                    _ => FileKind::File,
                };
                FileEntry::new(entry.name, kind)
            })
            .collect())
    }

    fn url(&self, port: u16) -> String {
        format!("https://{}", self.host(port))
    }

    async fn download_url(
        &self,
        path: &str,
        expires_in_secs: Option<u64>,
    ) -> anyhow::Result<String> {
        let mut url = format!(
            "https://{}/files?path={}&username={SANDBOX_USER}",
            self.host(ENVD_PORT),
            urlencoding::encode(path)
        );

        if let Some(token) = self.access_token.as_deref() {
            let expiration = match expires_in_secs {
                Some(secs) => {
                    let secs = i64::try_from(secs)
                        .map_err(|_| anyhow::anyhow!("Signature expiration {secs}s is too large"))?;
                    Some(chrono::Utc::now().timestamp().saturating_add(secs))
                }
                None => None,
            };
            let signature = Self::signature(path, "read", SANDBOX_USER, token, expiration);
            url.push_str(&format!("&signature={}", urlencoding::encode(&signature)));
            if let Some(expiration) = expiration {
                url.push_str(&format!("&signature_expiration={expiration}"));
            }
        }

        Ok(url)
    }

    async fn kill(&self) -> anyhow::Result<()> {
        let request = self.api.http.delete(self.api.sandbox_url(&self.id, ""));
        let (status, body_text) = self.api.send(request, "kill").await?;

        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            anyhow::bail!("E2B API returned {status}: {body_text}")
        }
    }
}
