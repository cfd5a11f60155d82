//! Model Provider Trait
//!
//! The single seam between the assistant and whichever model API backs it.

use async_trait::async_trait;

use super::types::{LlmError, LlmResponse, LlmResult, Message, ToolCallMode, ToolDefinition};

/// A model gateway: one request in, one complete response out.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs and errors
    fn name(&self) -> &'static str;

    /// Model this provider is configured for
    fn model(&self) -> &str;

    /// Run one completion over the given transcript.
    ///
    /// `tools` declares what the model may call and `tool_choice` whether
    /// it may call anything at all this round.
    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolCallMode,
    ) -> LlmResult<LlmResponse>;
}

/// Error for a provider invoked without credentials
pub fn missing_api_key_error(provider: &str) -> LlmError {
    LlmError::AuthenticationFailed {
        message: format!("API key not configured for {provider}"),
    }
}

/// Map an HTTP failure status to the gateway error taxonomy
pub fn http_error_for_status(status: u16, body: &str, provider: &str) -> LlmError {
    match status {
        400 => LlmError::InvalidRequest {
            message: body.into(),
        },
        401 | 403 => LlmError::AuthenticationFailed {
            message: format!("{provider}: access denied (HTTP {status})"),
        },
        404 => LlmError::ModelNotFound { model: body.into() },
        429 => LlmError::RateLimited {
            message: body.into(),
        },
        500..=599 => LlmError::ServerError {
            message: body.into(),
            status: Some(status),
        },
        other => LlmError::Other {
            message: format!("HTTP {other}: {body}"),
        },
    }
}
