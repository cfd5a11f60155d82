//! Model Gateway Types
//!
//! Conversation, tool and response types shared by the assistant and the
//! provider implementations.

use serde::{Deserialize, Serialize};

/// Whether the model is allowed to request tools for a given completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallMode {
    /// The model decides whether to call tools.
    #[default]
    Auto,
    /// Tool calling is disabled; the model must answer in text.
    None,
}

/// Settings for the model provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Endpoint override for OpenAI-compatible gateways
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Model name
    pub model: String,
    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "gpt-4o".into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Who authored a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One content block inside a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text
    Text { text: String },
    /// The assistant asking for a tool invocation
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The outcome of a tool invocation, correlated by the call id
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// One turn of the transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<MessageContent>,
}

impl Message {
    /// A user turn with a single text block
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![MessageContent::Text { text: text.into() }],
        }
    }

    /// An assistant turn with a single text block
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![MessageContent::Text { text: text.into() }],
        }
    }

    /// A tool turn answering the call identified by `tool_use_id`
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let block = MessageContent::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error: is_error.then_some(true),
        };
        Self {
            role: MessageRole::User,
            content: vec![block],
        }
    }
}

/// A callable tool as declared to the model.
///
/// The schema is kept as raw JSON so the declaration matches what the
/// tool server advertised, byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id assigned by the model, echoed back in the tool turn
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Token accounting for one completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl UsageStats {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Other(String),
}

impl From<&str> for StopReason {
    fn from(raw: &str) -> Self {
        let normalized = raw.to_ascii_lowercase();
        match normalized.as_str() {
            "stop" | "end_turn" => Self::EndTurn,
            "length" | "max_tokens" => Self::MaxTokens,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolUse,
            _ => Self::Other(normalized),
        }
    }
}

/// What the model returned for one completion request.
///
/// Both `content` and `tool_calls` are untrusted: either may be empty or
/// missing regardless of the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: StopReason,
    pub usage: UsageStats,
    pub model: String,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Failures of the model gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmError {
    AuthenticationFailed { message: String },
    RateLimited { message: String },
    ModelNotFound { model: String },
    InvalidRequest { message: String },
    ServerError { message: String, status: Option<u16> },
    NetworkError { message: String },
    ParseError { message: String },
    Other { message: String },
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthenticationFailed { message } => write!(f, "Authentication failed: {message}"),
            Self::RateLimited { message } => write!(f, "Rate limited: {message}"),
            Self::ModelNotFound { model } => write!(f, "Model not found: {model}"),
            Self::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
            Self::ServerError {
                message,
                status: Some(status),
            } => write!(f, "Server error ({status}): {message}"),
            Self::ServerError { message, .. } => write!(f, "Server error: {message}"),
            Self::NetworkError { message } => write!(f, "Network error: {message}"),
            Self::ParseError { message } => write!(f, "Parse error: {message}"),
            Self::Other { message } => write!(f, "Error: {message}"),
        }
    }
}

impl std::error::Error for LlmError {}

impl From<LlmError> for crate::utils::error::AppError {
    fn from(err: LlmError) -> Self {
        Self::model_gateway(err.to_string())
    }
}

/// Result type for model gateway operations
pub type LlmResult<T> = Result<T, LlmError>;
