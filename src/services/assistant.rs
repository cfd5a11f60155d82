//! Assistant
//!
//! The conversation orchestrator: owns one tool session, drives the
//! model through a tool-calling exchange and produces a final answer.
//!
//! One query runs as: fetch the catalog, ask the model with tools
//! offered, execute whatever tool calls it requests, fold the results
//! back into the transcript in request order, then ask the model again
//! with tool use disabled so it synthesizes the answer.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::services::llm::provider::LlmProvider;
use crate::services::llm::types::{Message, MessageContent, MessageRole, ToolCallMode};
use crate::services::tools::catalog::ToolCatalog;
use crate::services::tools::session::{ToolServerConfig, ToolSession};
use crate::utils::error::{AppError, AppResult};

/// The result of one orchestrated query
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Final natural-language answer
    pub answer: String,
    /// The complete conversation transcript of the run
    pub transcript: Vec<Message>,
}

/// Conversation orchestrator owning one exclusive tool session.
pub struct Assistant {
    provider: Arc<dyn LlmProvider>,
    server: ToolServerConfig,
    session: Option<ToolSession>,
    cancel: CancellationToken,
}

impl Assistant {
    pub fn new(provider: Arc<dyn LlmProvider>, server: ToolServerConfig) -> Self {
        Self {
            provider,
            server,
            session: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels the in-flight run when triggered. The session
    /// is still released; the run ends with a `Cancelled` error.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether a tool session is currently established
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Establish the tool session. Idempotent.
    pub async fn connect(&mut self) -> AppResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let session = ToolSession::connect(&self.server).await?;
        tracing::info!(
            server = %self.server.name,
            protocol = %session.protocol_version(),
            "Connected to tool server"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Answer one query, returning only the final text
    pub async fn answer_query(&mut self, query: &str) -> AppResult<String> {
        Ok(self.run_query(query).await?.answer)
    }

    /// Answer one query, returning the answer and the full transcript.
    ///
    /// Fatal errors (transport, protocol, model gateway, cancellation)
    /// tear the session down before returning; the partial transcript is
    /// discarded with the error.
    pub async fn run_query(&mut self, query: &str) -> AppResult<QueryOutcome> {
        let result = match &self.session {
            Some(session) => {
                run_conversation(self.provider.as_ref(), session, &self.cancel, query).await
            }
            None => Err(AppError::connection("Assistant is not connected")),
        };

        if result.is_err() {
            self.shutdown().await;
        }
        result
    }

    /// Release the tool session. Idempotent; safe before `connect`.
    pub async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

/// Race a step of the run against cancellation
async fn guard<T, F>(cancel: &CancellationToken, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::cancelled("Query run was cancelled")),
        result = fut => result,
    }
}

/// Drive one conversation over an established session
async fn run_conversation(
    provider: &dyn LlmProvider,
    session: &ToolSession,
    cancel: &CancellationToken,
    query: &str,
) -> AppResult<QueryOutcome> {
    let infos = guard(cancel, session.list_tools()).await?;
    let catalog = ToolCatalog::build(&infos);
    tracing::debug!(tools = catalog.len(), "Offering catalog to the model");

    let mut transcript = vec![Message::user(query)];

    let response = guard(cancel, async {
        provider
            .send_message(
                transcript.clone(),
                None,
                catalog.definitions().to_vec(),
                ToolCallMode::Auto,
            )
            .await
            .map_err(AppError::from)
    })
    .await?;

    // Direct answer: no tool round needed
    if response.tool_calls.is_empty() {
        let answer = response.content.clone().unwrap_or_default();
        transcript.push(Message::assistant(answer.clone()));
        return Ok(QueryOutcome { answer, transcript });
    }

    // Assistant turn carrying the raw tool-call requests
    let mut blocks = Vec::new();
    if let Some(text) = &response.content {
        if !text.is_empty() {
            blocks.push(MessageContent::Text { text: text.clone() });
        }
    }
    for call in &response.tool_calls {
        blocks.push(MessageContent::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        });
    }
    transcript.push(Message {
        role: MessageRole::Assistant,
        content: blocks,
    });

    // Resolve every requested call to (content, is_error). Calls naming a
    // tool outside the offered catalog never reach the session. The rest
    // are dispatched concurrently; the session serializes them on the
    // wire, and join_all keeps the results in request order.
    let call_futures: Vec<_> = response
        .tool_calls
        .iter()
        .map(|call| {
            let known = catalog.contains(&call.name);
            async move {
                if !known {
                    tracing::warn!(
                        tool = %call.name,
                        "Model requested a tool outside the offered catalog"
                    );
                    return Ok((format!("Tool '{}' is not available", call.name), true));
                }

                match session.call_tool(&call.name, call.arguments.clone()).await {
                    Ok(result) => {
                        Ok((result.first_text().unwrap_or_default().to_string(), false))
                    }
                    Err(AppError::ToolExecution(message)) => Ok((message, true)),
                    Err(AppError::ToolNotFound(_)) => {
                        Ok((format!("Tool '{}' is not available", call.name), true))
                    }
                    Err(fatal) => Err(fatal),
                }
            }
        })
        .collect();

    let results = guard(cancel, async {
        futures_util::future::join_all(call_futures)
            .await
            .into_iter()
            .collect::<AppResult<Vec<_>>>()
    })
    .await?;

    for (call, (content, is_error)) in response.tool_calls.iter().zip(results) {
        transcript.push(Message::tool_result(&call.id, content, is_error));
    }

    // Final round: tool use disabled, the model must synthesize an answer
    let final_response = guard(cancel, async {
        provider
            .send_message(
                transcript.clone(),
                None,
                catalog.definitions().to_vec(),
                ToolCallMode::None,
            )
            .await
            .map_err(AppError::from)
    })
    .await?;

    let answer = final_response.content.clone().unwrap_or_default();
    transcript.push(Message::assistant(answer.clone()));

    Ok(QueryOutcome { answer, transcript })
}
