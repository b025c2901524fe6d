//! Minimal MCP client over stdio.
//!
//! Speaks newline-delimited JSON-RPC 2.0 to a sidecar process: one
//! `initialize` request, the `notifications/initialized` notification, then
//! `tools/call` requests. Only what the Python analyzer needs is implemented.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use repoguard_types::{RepoGuardError, Result};

use crate::process::CommandRunner;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// How to launch the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl McpServerCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for McpServerCommand {
    /// `uvx mcp-server-analyzer`, which exposes `ruff-check`.
    fn default() -> Self {
        Self::new("uvx", &["mcp-server-analyzer"])
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// A live, initialized connection to one sidecar process.
///
/// The child is spawned with `kill_on_drop` in its own process group, with
/// the same credential-stripped environment as other analyzer commands.
/// Dropping the session (for example when the dispatcher's timeout fires)
/// never leaks the sidecar.
pub struct McpSession {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl McpSession {
    /// Spawn the sidecar and complete the initialize handshake.
    pub async fn connect(command: &McpServerCommand) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .env_clear()
            .envs(CommandRunner::filtered_env())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RepoGuardError::ToolNotInstalled {
                    tool: command.program.clone(),
                }
            } else {
                RepoGuardError::Io(e)
            }
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RepoGuardError::Protocol("sidecar stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RepoGuardError::Protocol("sidecar stdout unavailable".into()))?;

        let mut session = Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
        };
        session.initialize().await?;
        Ok(session)
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "repoguard",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        self.request("initialize", Some(params)).await?;
        self.notify("notifications/initialized", serde_json::json!({}))
            .await?;
        tracing::debug!("MCP sidecar initialized");
        Ok(())
    }

    /// Call a tool and return its text content blocks joined by newlines.
    ///
    /// A result without text blocks yields an empty string.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<String> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let result = self.request("tools/call", Some(params)).await?;
        Ok(extract_text(&result))
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        self.write_line(&serde_json::to_string(&request)?).await?;

        let response = self.read_response(id).await?;
        if let Some(err) = response.error {
            return Err(RepoGuardError::Protocol(format!(
                "{method} failed: [{}] {}",
                err.code, err.message
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        let msg = serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.write_line(&serde_json::to_string(&msg)?).await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read lines until the response carrying `id` arrives. Blank lines,
    /// log noise and server-initiated notifications are skipped.
    async fn read_response(&mut self, id: u64) -> Result<JsonRpcResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.reader.read_line(&mut line).await?;
            if read == 0 {
                return Err(RepoGuardError::Protocol(
                    "sidecar closed stdout before responding".into(),
                ));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == Some(id) => return Ok(resp),
                Ok(_) => continue,
                Err(_) => {
                    tracing::trace!(line = trimmed, "Skipping non-JSON sidecar output");
                    continue;
                }
            }
        }
    }

    /// Close stdin, signal the sidecar's process group, and reap it.
    pub async fn shutdown(mut self) {
        let _ = self.stdin.shutdown().await;
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: signalling the group this session's child leads.
                unsafe {
                    libc::kill(-(pid as i32), libc::SIGTERM);
                }
            }
        }
        let _ = self.child.kill().await;
    }
}

/// Join the `text` fields of an MCP `content` array.
pub fn extract_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}
