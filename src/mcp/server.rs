//! Newline-delimited JSON-RPC server loop.
//!
//! One reader consumes request lines, cheap methods are answered inline and
//! every `tools/call` is spawned onto a [`JoinSet`]. All responses go through
//! a single writer task, so concurrent calls never interleave their output.

use super::protocol::{
    CallToolParams, CallToolResult, InitializeParams, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ServerInfo, DEFAULT_PROTOCOL_VERSION, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::tools::{ToolDispatcher, ToolError};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Longest accepted request line. Longer lines are answered with a parse
/// error and skipped.
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read request stream: {0}")]
    Read(#[source] LinesCodecError),
    #[error("failed to write response stream: {0}")]
    Write(#[source] LinesCodecError),
    #[error("response writer task failed: {0}")]
    Writer(#[from] tokio::task::JoinError),
}

type Responder = mpsc::UnboundedSender<JsonRpcResponse>;

pub struct McpServer {
    dispatcher: Arc<ToolDispatcher>,
    shutdown_grace: Duration,
}

impl McpServer {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            dispatcher,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// How long in-flight tool calls may keep running once reading stops.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Serve requests from `reader` until EOF or until `shutdown` resolves,
    /// then give in-flight calls the grace period before aborting them.
    ///
    /// Aborting a call never strands a sandbox: remote creates and kills run
    /// on the registry's own tasks, and `SandboxRegistry::cleanup_all` waits
    /// for them. Callers must run it after this returns.
    pub async fn serve<R, W, F>(&self, reader: R, writer: W, shutdown: F) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_responses(writer, rx));
        let mut calls = JoinSet::new();
        tokio::pin!(shutdown);

        tracing::info!("MCP server listening on stdio");
        let mut read_error = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting requests");
                    break;
                }
                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "tool call task failed");
                    }
                }
                line = lines.next() => match line {
                    None => {
                        tracing::info!("request stream closed");
                        break;
                    }
                    Some(Ok(line)) => self.handle_line(&line, &tx, &mut calls),
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        tracing::warn!(limit = MAX_LINE_BYTES, "request line too long");
                        respond(&tx, JsonRpcResponse::failure(
                            Value::Null,
                            JsonRpcError::new(PARSE_ERROR, "Request line too long"),
                        ));
                    }
                    Some(Err(e)) => {
                        read_error = Some(e);
                        break;
                    }
                },
            }
        }

        self.drain(&mut calls).await;
        drop(tx);
        writer.await?.map_err(ServerError::Write)?;

        match read_error {
            Some(e) => Err(ServerError::Read(e)),
            None => Ok(()),
        }
    }

    async fn drain(&self, calls: &mut JoinSet<()>) {
        if calls.is_empty() {
            return;
        }
        tracing::info!(in_flight = calls.len(), "waiting for in-flight tool calls");
        let finished = tokio::time::timeout(self.shutdown_grace, async {
            while let Some(joined) = calls.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "tool call task failed");
                }
            }
        })
        .await;

        if finished.is_err() {
            tracing::warn!(
                remaining = calls.len(),
                grace_secs = self.shutdown_grace.as_secs(),
                "grace period elapsed, aborting tool calls"
            );
            calls.abort_all();
            while calls.join_next().await.is_some() {}
        }
    }

    fn handle_line(&self, line: &str, tx: &Responder, calls: &mut JoinSet<()>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                respond(tx, JsonRpcResponse::failure(
                    Value::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ));
                return;
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                respond(tx, JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
                ));
                return;
            }
        };

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return;
        }
        let id = request.id.clone().unwrap_or(Value::Null);
        tracing::debug!(method = %request.method, id = %id, "request received");

        match request.method.as_str() {
            "initialize" => respond(tx, JsonRpcResponse::success(id, initialize(request.params))),
            "ping" => respond(tx, JsonRpcResponse::success(id, json!({}))),
            "tools/list" => respond(
                tx,
                JsonRpcResponse::success(id, json!({ "tools": self.dispatcher.definitions() })),
            ),
            "tools/call" => {
                let dispatcher = Arc::clone(&self.dispatcher);
                let tx = tx.clone();
                calls.spawn(async move {
                    let response = call_tool(&dispatcher, id, request.params).await;
                    respond(&tx, response);
                });
            }
            other => respond(tx, JsonRpcResponse::failure(
                id,
                JsonRpcError::new(METHOD_NOT_FOUND, format!("Method not found: {other}")),
            )),
        }
    }
}

fn respond(tx: &Responder, response: JsonRpcResponse) {
    if tx.send(response).is_err() {
        tracing::warn!("response writer is gone, dropping response");
    }
}

fn initialize(params: Option<Value>) -> Value {
    let requested = params
        .and_then(|p| serde_json::from_value::<InitializeParams>(p).ok())
        .and_then(|p| p.protocol_version);
    json!({
        "protocolVersion": requested.as_deref().unwrap_or(DEFAULT_PROTOCOL_VERSION),
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": ServerInfo::current(),
    })
}

async fn call_tool(dispatcher: &ToolDispatcher, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
        Ok(Some(params)) => params,
        Ok(None) => {
            return JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_PARAMS, "Missing params for tools/call"),
            )
        }
        Err(e) => {
            return JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {e}")),
            )
        }
    };

    let arguments = params.arguments.unwrap_or(Value::Null);
    let result = match dispatcher.dispatch(&params.name, arguments).await {
        Ok(output) => CallToolResult::text(output.text(), false),
        Err(e @ ToolError::UnknownTool(_)) => {
            return JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_PARAMS, e.to_string()).with_data(e.to_payload()),
            )
        }
        Err(e) => {
            let payload = e.to_payload();
            let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
            CallToolResult::text(text, true)
        }
    };

    match serde_json::to_value(result) {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(e) => JsonRpcResponse::failure(id, JsonRpcError::new(INTERNAL_ERROR, e.to_string())),
    }
}

async fn write_responses<W>(
    writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> Result<(), LinesCodecError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());
    while let Some(response) = rx.recv().await {
        match serde_json::to_string(&response) {
            Ok(line) => sink.send(line).await?,
            Err(e) => tracing::error!(error = %e, "failed to encode response"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::fake::FakeProvider;
    use crate::sandbox::{SandboxLimits, SandboxRegistry};

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(SandboxRegistry::new(
            Arc::new(FakeProvider::new()),
            SandboxLimits::default(),
        )))
    }

    #[test]
    fn initialize_echoes_requested_version() {
        let result = initialize(Some(json!({"protocolVersion": "2025-03-26"})));
        assert_eq!(result["protocolVersion"], "2025-03-26");
        let result = initialize(None);
        assert_eq!(result["protocolVersion"], DEFAULT_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
    }

    #[tokio::test]
    async fn tool_failure_is_an_error_result() {
        let d = dispatcher();
        let resp = call_tool(
            &d,
            json!(1),
            Some(json!({"name": "read_file", "arguments": {"filePath": "/x", "sandboxId": "nope"}})),
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        let text: Value =
            serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(text["error"]["code"], "sandbox_not_found");
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let d = dispatcher();
        let resp = call_tool(&d, json!(2), Some(json!({"name": "nope"}))).await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, INVALID_PARAMS);
        assert_eq!(error.data.unwrap()["error"]["code"], "unknown_tool");
    }

    #[tokio::test]
    async fn missing_params_are_invalid() {
        let d = dispatcher();
        let resp = call_tool(&d, json!(3), None).await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }
}
