//! Tool Server
//!
//! The tool-execution process the assistant spawns: a newline-delimited
//! JSON-RPC 2.0 server over stdio exposing the mailbox operations as
//! callable tools. Run with `courier serve-tools`.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::models::{CreateUserRequest, SendMessageRequest};
use crate::services::mailbox::MailboxService;
use crate::utils::error::{AppError, AppResult};

/// Protocol version reported in the initialize response
const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC code for an unknown method or tool
const CODE_METHOD_NOT_FOUND: i64 = -32601;

/// Stdio JSON-RPC server exposing mailbox tools
pub struct ToolServer {
    mailbox: MailboxService,
}

impl ToolServer {
    pub fn new(mailbox: MailboxService) -> Self {
        Self { mailbox }
    }

    /// The tool descriptors advertised through `tools/list`
    pub fn tool_descriptors() -> Vec<Value> {
        let string_prop = |description: &str| {
            serde_json::json!({"type": "string", "description": description})
        };

        vec![
            serde_json::json!({
                "name": "create_user",
                "description": "Create new user",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "email": string_prop("Email address of the new user"),
                        "name": string_prop("Display name of the new user")
                    },
                    "required": ["email", "name"]
                }
            }),
            serde_json::json!({
                "name": "get_user_by_email",
                "description": "Get user by email",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "email": string_prop("Email address to look up")
                    },
                    "required": ["email"]
                }
            }),
            serde_json::json!({
                "name": "get_all_users",
                "description": "Retrieve all users",
                "inputSchema": {
                    "type": "object",
                    "properties": {}
                }
            }),
            serde_json::json!({
                "name": "send_message",
                "description": "Send a message to one or more recipients",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "sender_id": string_prop("Id of the sending user"),
                        "recipients": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Ids of the receiving users"
                        },
                        "subject": string_prop("Subject line"),
                        "content": string_prop("Message body")
                    },
                    "required": ["sender_id", "recipients", "content"]
                }
            }),
            serde_json::json!({
                "name": "get_all_sent_message",
                "description": "View all messages sent by a user",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "sender_id": string_prop("Id of the sending user")
                    },
                    "required": ["sender_id"]
                }
            }),
            serde_json::json!({
                "name": "view_inbox",
                "description": "View inbox messages of a user",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "user_id": string_prop("Id of the user whose inbox to view")
                    },
                    "required": ["user_id"]
                }
            }),
            serde_json::json!({
                "name": "get_unread_message",
                "description": "View unread messages for a recipient",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "recipient_id": string_prop("Id of the recipient")
                    },
                    "required": ["recipient_id"]
                }
            }),
            serde_json::json!({
                "name": "get_message_with_recipients",
                "description": "View a message with all its recipients",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "message_id": string_prop("Id of the message")
                    },
                    "required": ["message_id"]
                }
            }),
            serde_json::json!({
                "name": "mark_as_read",
                "description": "Mark a message as read for a recipient",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "message_id": string_prop("Id of the message"),
                        "recipient_id": string_prop("Id of the recipient")
                    },
                    "required": ["message_id", "recipient_id"]
                }
            }),
        ]
    }

    /// Serve requests until the input stream closes.
    ///
    /// Generic over the byte streams so tests can drive the server over an
    /// in-memory pipe instead of real stdio.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> AppResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                tracing::info!("Input stream closed, shutting down tool server");
                return Ok(());
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Skipping unparseable request line: {}", e);
                    continue;
                }
            };

            if let Some(response) = self.handle_request(&request) {
                let out = serde_json::to_string(&response)?;
                writer.write_all(out.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
    }

    /// Handle one request. Returns `None` for notifications.
    fn handle_request(&self, request: &Value) -> Option<Value> {
        let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("");
        let id = request.get("id").cloned();

        let body = match method {
            "initialize" => Ok(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {
                    "name": "courier-mailbox",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            "notifications/initialized" => return None,
            "tools/list" => Ok(serde_json::json!({"tools": Self::tool_descriptors()})),
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));

                match self.dispatch_tool(name, &arguments) {
                    Ok(result) => {
                        let text = serde_json::to_string_pretty(&result)
                            .unwrap_or_else(|_| result.to_string());
                        Ok(serde_json::json!({
                            "content": [{"type": "text", "text": text}]
                        }))
                    }
                    Err(AppError::ToolNotFound(msg)) => {
                        Err((CODE_METHOD_NOT_FOUND, format!("Unknown tool: {}", msg)))
                    }
                    Err(e) => {
                        // Tool failures are data, not transport faults
                        Ok(serde_json::json!({
                            "content": [{"type": "text", "text": format!("Error: {}", e)}],
                            "isError": true
                        }))
                    }
                }
            }
            other => Err((
                CODE_METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        };

        // Requests without an id are notifications and get no response
        let id = id?;

        Some(match body {
            Ok(result) => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result
            }),
            Err((code, message)) => serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": message}
            }),
        })
    }

    /// Execute one tool call against the mailbox
    fn dispatch_tool(&self, name: &str, args: &Value) -> AppResult<Value> {
        match name {
            "create_user" => {
                let request = CreateUserRequest {
                    email: str_arg(args, "email")?,
                    name: str_arg(args, "name")?,
                };
                Ok(serde_json::to_value(self.mailbox.create_user(&request)?)?)
            }
            "get_user_by_email" => {
                let email = str_arg(args, "email")?;
                Ok(serde_json::to_value(
                    self.mailbox.get_user_by_email(&email)?,
                )?)
            }
            "get_all_users" => Ok(serde_json::to_value(self.mailbox.get_all_users()?)?),
            "send_message" => {
                let request = SendMessageRequest {
                    sender_id: str_arg(args, "sender_id")?,
                    recipients: string_list_arg(args, "recipients")?,
                    subject: args
                        .get("subject")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                    content: str_arg(args, "content")?,
                };
                Ok(serde_json::to_value(self.mailbox.send_message(&request)?)?)
            }
            "get_all_sent_message" => {
                let sender_id = str_arg(args, "sender_id")?;
                Ok(serde_json::to_value(
                    self.mailbox.get_all_sent_message(&sender_id)?,
                )?)
            }
            "view_inbox" => {
                let user_id = str_arg(args, "user_id")?;
                Ok(serde_json::to_value(self.mailbox.view_inbox(&user_id)?)?)
            }
            "get_unread_message" => {
                let recipient_id = str_arg(args, "recipient_id")?;
                Ok(serde_json::to_value(
                    self.mailbox.get_unread_message(&recipient_id)?,
                )?)
            }
            "get_message_with_recipients" => {
                let message_id = str_arg(args, "message_id")?;
                Ok(serde_json::to_value(
                    self.mailbox.get_message_with_recipients(&message_id)?,
                )?)
            }
            "mark_as_read" => {
                let message_id = str_arg(args, "message_id")?;
                let recipient_id = str_arg(args, "recipient_id")?;
                Ok(serde_json::to_value(
                    self.mailbox.mark_as_read(&message_id, &recipient_id)?,
                )?)
            }
            other => Err(AppError::tool_not_found(other.to_string())),
        }
    }
}

/// Extract a required string argument
fn str_arg(args: &Value, key: &str) -> AppResult<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::validation(format!("Missing required argument '{}'", key)))
}

/// Extract a required array-of-strings argument
fn string_list_arg(args: &Value, key: &str) -> AppResult<Vec<String>> {
    let entries = args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| AppError::validation(format!("Missing required argument '{}'", key)))?;

    entries
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| AppError::validation(format!("'{}' must be a list of strings", key)))
        })
        .collect()
}
