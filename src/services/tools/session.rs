//! Tool Session
//!
//! JSON-RPC 2.0 client owning one spawned tool-server process. Requests
//! and responses are newline-delimited JSON over the child's stdio; the
//! initialization handshake runs before the session is handed out, so a
//! `ToolSession` value is always ready for `list_tools`/`call_tool`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::utils::error::{AppError, AppResult};

/// Protocol version spoken on the wire
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Per-read timeout for responses from the tool server
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// JSON-RPC code for an unknown method or tool
const CODE_METHOD_NOT_FOUND: i64 = -32601;

/// Launch specification for a tool-server process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Server name (for display/identification)
    pub name: String,
    /// Command to spawn
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ToolServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }
}

/// A tool advertised by the tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name, unique within the server
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the tool's input parameters
    pub input_schema: Value,
}

/// One content block of a tool result. Content kinds other than text are
/// carried opaquely so they never break result consumption.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text { text: String },
    Other { kind: String },
}

/// Result of a successful tool invocation
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub content: Vec<ContentPart>,
}

impl ToolCallResult {
    /// The first text block of the result, if any
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Other { .. } => None,
        })
    }
}

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcRequest {
    fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<u64>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[allow(dead_code)]
    data: Option<Value>,
}

/// Transport state for the spawned process
#[derive(Debug)]
struct StdioTransport {
    process: Child,
    stdin: ChildStdin,
    stdout_reader: BufReader<ChildStdout>,
}

/// A live session to one tool-server process.
///
/// The transport sits behind a mutex held across each request/response
/// pair, so concurrent callers are serialized on the wire and responses
/// always correlate with their request. The child is spawned with
/// `kill_on_drop`, so the process is released even when the session is
/// dropped without an explicit `close`.
#[derive(Debug)]
pub struct ToolSession {
    server_name: String,
    protocol_version: String,
    transport: Mutex<Option<StdioTransport>>,
    request_id: AtomicU64,
}

impl ToolSession {
    /// Spawn the tool server and perform the initialization handshake.
    pub async fn connect(config: &ToolServerConfig) -> AppResult<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut process = cmd.spawn().map_err(|e| {
            AppError::connection(format!(
                "Failed to spawn tool server '{}' (command: {}): {}",
                config.name, config.command, e
            ))
        })?;

        let stdin = process.stdin.take().ok_or_else(|| {
            AppError::connection(format!(
                "Failed to capture stdin for tool server '{}'",
                config.name
            ))
        })?;

        let stdout = process.stdout.take().ok_or_else(|| {
            AppError::connection(format!(
                "Failed to capture stdout for tool server '{}'",
                config.name
            ))
        })?;

        let mut transport = StdioTransport {
            process,
            stdin,
            stdout_reader: BufReader::new(stdout),
        };

        let request_id = AtomicU64::new(1);
        let protocol_version = Self::handshake(&mut transport, &request_id, &config.name).await?;

        Ok(Self {
            server_name: config.name.clone(),
            protocol_version,
            transport: Mutex::new(Some(transport)),
            request_id,
        })
    }

    /// Perform the initialize exchange. Any failure here means the session
    /// never came up, so everything maps to a connection error.
    async fn handshake(
        transport: &mut StdioTransport,
        request_id: &AtomicU64,
        name: &str,
    ) -> AppResult<String> {
        let id = request_id.fetch_add(1, Ordering::SeqCst);
        let init_request = JsonRpcRequest::new(
            id,
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "courier",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
        );

        Self::write_message(&mut transport.stdin, &init_request)
            .await
            .map_err(|e| {
                AppError::connection(format!("Tool server '{}' initialization failed: {}", name, e))
            })?;

        let response = Self::read_response(&mut transport.stdout_reader, id)
            .await
            .map_err(|e| {
                AppError::connection(format!("Tool server '{}' initialization failed: {}", name, e))
            })?;

        let result = response.result.ok_or_else(|| {
            let detail = response
                .error
                .map(|e| format!("code={}, message={}", e.code, e.message))
                .unwrap_or_else(|| "no result in initialize response".to_string());
            AppError::connection(format!(
                "Tool server '{}' initialization failed: {}",
                name, detail
            ))
        })?;

        // Initialized notification carries no id and expects no response
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {}
        });
        let line = serde_json::to_string(&notification)?;
        transport
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::connection(format!("Failed to send notification: {}", e)))?;
        transport
            .stdin
            .write_all(b"\n")
            .await
            .map_err(|e| AppError::connection(format!("Failed to send notification: {}", e)))?;
        transport
            .stdin
            .flush()
            .await
            .map_err(|e| AppError::connection(format!("Failed to flush stdin: {}", e)))?;

        Ok(result
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string())
    }

    /// Serialize and send one newline-delimited request
    async fn write_message(stdin: &mut ChildStdin, request: &JsonRpcRequest) -> AppResult<()> {
        let line = serde_json::to_string(request)?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::connection(format!("Failed to write to tool server: {}", e)))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| AppError::connection(format!("Failed to write to tool server: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| AppError::connection(format!("Failed to flush stdin: {}", e)))?;
        Ok(())
    }

    /// Read the response matching `expected_id`.
    ///
    /// Non-JSON lines (stray log output) and server-initiated
    /// notifications are skipped; a response carrying a different id is a
    /// protocol error.
    async fn read_response(
        reader: &mut BufReader<ChildStdout>,
        expected_id: u64,
    ) -> AppResult<JsonRpcResponse> {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = tokio::time::timeout(
                Duration::from_secs(REQUEST_TIMEOUT_SECS),
                reader.read_line(&mut line),
            )
            .await
            .map_err(|_| AppError::connection("Timed out waiting for tool server response"))?
            .map_err(|e| {
                AppError::connection(format!("Failed to read from tool server: {}", e))
            })?;

            if bytes_read == 0 {
                return Err(AppError::connection(
                    "Tool server closed stdout (process may have exited)",
                ));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(_) => continue,
            };

            if value.get("method").is_some() {
                // Server-initiated notification or request; not ours
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(value).map_err(|e| {
                AppError::protocol(format!("Unparseable tool server response: {}", e))
            })?;

            match response.id {
                Some(id) if id == expected_id => return Ok(response),
                other => {
                    return Err(AppError::protocol(format!(
                        "Response id mismatch: expected {}, got {:?}",
                        expected_id, other
                    )))
                }
            }
        }
    }

    /// Send one request and read its matching response, holding the
    /// transport for the whole exchange.
    async fn send_request(&self, method: &str, params: Option<Value>) -> AppResult<JsonRpcResponse> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let mut guard = self.transport.lock().await;
        let transport = guard
            .as_mut()
            .ok_or_else(|| AppError::connection("Tool session is closed"))?;

        Self::write_message(&mut transport.stdin, &request).await?;
        Self::read_response(&mut transport.stdout_reader, id).await
    }

    /// List all tools the server offers
    pub async fn list_tools(&self) -> AppResult<Vec<ToolInfo>> {
        let response = self.send_request("tools/list", None).await?;

        let result = response.result.ok_or_else(|| {
            let detail = response
                .error
                .map(|e| format!("code={}, message={}", e.code, e.message))
                .unwrap_or_else(|| "no result in tools/list response".to_string());
            AppError::protocol(format!("tools/list failed: {}", detail))
        })?;

        let entries = result
            .get("tools")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AppError::protocol("tools/list response is missing the tools array"))?;

        let mut tools = Vec::with_capacity(entries.len());
        for entry in entries {
            let name = entry
                .get("name")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::protocol("Tool descriptor is missing a name"))?
                .to_string();
            let description = entry
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let input_schema = entry
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"type": "object"}));

            tools.push(ToolInfo {
                name,
                description,
                input_schema,
            });
        }

        Ok(tools)
    }

    /// Call a tool and wait for its result.
    ///
    /// Remote failures are classified: an unknown tool is `ToolNotFound`,
    /// an execution failure (JSON-RPC error or `isError` result) is
    /// `ToolExecution`, malformed framing is `Protocol`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> AppResult<ToolCallResult> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let response = self.send_request("tools/call", Some(params)).await?;

        if let Some(error) = response.error {
            if error.code == CODE_METHOD_NOT_FOUND {
                return Err(AppError::tool_not_found(format!(
                    "'{}': {}",
                    name, error.message
                )));
            }
            return Err(AppError::tool_execution(error.message));
        }

        let result = response
            .result
            .ok_or_else(|| AppError::protocol("tools/call response had neither result nor error"))?;

        let content = result
            .get("content")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| {
                        let kind = entry.get("type").and_then(|v| v.as_str()).unwrap_or("");
                        if kind == "text" {
                            ContentPart::Text {
                                text: entry
                                    .get("text")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("")
                                    .to_string(),
                            }
                        } else {
                            ContentPart::Other {
                                kind: kind.to_string(),
                            }
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let call_result = ToolCallResult { content };

        let is_error = result
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if is_error {
            let message = call_result
                .first_text()
                .unwrap_or("tool execution failed")
                .to_string();
            return Err(AppError::tool_execution(message));
        }

        Ok(call_result)
    }

    /// Terminate the tool server and release the transport. Idempotent.
    pub async fn close(&self) {
        let mut guard = self.transport.lock().await;
        if let Some(mut transport) = guard.take() {
            let _ = transport.stdin.shutdown().await;
            let _ = transport.process.kill().await;
        }
    }

    /// Server name from the launch configuration
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Protocol version reported by the server during the handshake
    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }
}
