//! OpenAI Provider
//!
//! Chat-completions client for OpenAI and API-compatible gateways.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::{http_error_for_status, missing_api_key_error, LlmProvider};
use super::types::{
    LlmError, LlmResponse, LlmResult, Message, MessageContent, MessageRole, ProviderConfig,
    StopReason, ToolCall, ToolCallMode, ToolDefinition, UsageStats,
};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAIProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL)
    }

    /// Assemble the chat-completions payload
    fn build_payload(
        &self,
        messages: &[Message],
        system: Option<&str>,
        tools: &[ToolDefinition],
        tool_choice: ToolCallMode,
    ) -> Value {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = system {
            wire_messages.push(json!({"role": "system", "content": prompt}));
        }
        wire_messages.extend(messages.iter().map(Self::to_wire_message));

        let mut payload = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": wire_messages,
        });

        if !tools.is_empty() {
            payload["tools"] = tools.iter().map(Self::to_wire_tool).collect();
            payload["tool_choice"] = json!(match tool_choice {
                ToolCallMode::Auto => "auto",
                ToolCallMode::None => "none",
            });
        }

        payload
    }

    /// Convert one transcript turn to the OpenAI message shape.
    ///
    /// Tool result blocks become `role: "tool"` messages; tool-use blocks
    /// become `tool_calls` entries with stringified arguments.
    fn to_wire_message(message: &Message) -> Value {
        for block in &message.content {
            if let MessageContent::ToolResult {
                tool_use_id,
                content,
                ..
            } = block
            {
                return json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                });
            }
        }

        let role = match message.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        let text = message
            .content
            .iter()
            .filter_map(|block| match block {
                MessageContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let calls: Vec<Value> = message
            .content
            .iter()
            .filter_map(|block| match block {
                MessageContent::ToolUse { id, name, input } => Some(json!({
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": input.to_string()},
                })),
                _ => None,
            })
            .collect();

        let mut wire = json!({"role": role});
        if calls.is_empty() || !text.is_empty() {
            wire["content"] = json!(text);
        }
        if !calls.is_empty() {
            wire["tool_calls"] = json!(calls);
        }
        wire
    }

    /// Declare one tool; the schema passes through untouched
    fn to_wire_tool(tool: &ToolDefinition) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            },
        })
    }

    fn to_response(&self, wire: WireResponse) -> LlmResponse {
        let choice = wire.choices.into_iter().next();

        let stop_reason = choice
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
            .map(StopReason::from)
            .unwrap_or(StopReason::EndTurn);

        let message = choice.and_then(|c| c.message);
        let content = message.as_ref().and_then(|m| m.content.clone());
        let tool_calls = message
            .map(|m| m.tool_calls.unwrap_or_default())
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: serde_json::from_str(&call.function.arguments)
                    .unwrap_or(Value::Null),
            })
            .collect();

        let usage = wire
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        LlmResponse {
            content,
            tool_calls,
            stop_reason,
            usage,
            model: wire.model,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        system: Option<String>,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolCallMode,
    ) -> LlmResult<LlmResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| missing_api_key_error("openai"))?;

        let payload = self.build_payload(&messages, system.as_deref(), &tools, tool_choice);

        let network_err = |e: reqwest::Error| LlmError::NetworkError {
            message: e.to_string(),
        };

        let http_response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(network_err)?;

        let status = http_response.status().as_u16();
        let body = http_response.text().await.map_err(network_err)?;

        if status != 200 {
            return Err(http_error_for_status(status, &body, "openai"));
        }

        let wire: WireResponse = serde_json::from_str(&body).map_err(|e| LlmError::ParseError {
            message: format!("Unexpected completion response: {e}"),
        })?;

        Ok(self.to_response(wire))
    }
}

/// Subset of the chat-completions response we consume
#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: Option<WireMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
