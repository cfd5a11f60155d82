//! Assistant Orchestration Tests
//!
//! Full runs of the conversation orchestrator: a scripted model provider
//! stands in for the gateway, and mock python3 stdio servers stand in
//! for the tool process.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use courier::services::assistant::Assistant;
use courier::services::llm::provider::LlmProvider;
use courier::services::llm::types::{
    LlmError, LlmResponse, LlmResult, Message, MessageContent, MessageRole, StopReason, ToolCall,
    ToolCallMode, ToolDefinition, UsageStats,
};
use courier::services::tools::session::ToolServerConfig;
use courier::utils::error::AppError;

/// A provider that replays a fixed list of responses and records what it
/// was asked.
struct ScriptedProvider {
    responses: Mutex<VecDeque<LlmResult<LlmResponse>>>,
    requests: Mutex<Vec<(Vec<Message>, Vec<ToolDefinition>, ToolCallMode)>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<LlmResult<LlmResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(Vec<Message>, Vec<ToolDefinition>, ToolCallMode)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn send_message(
        &self,
        messages: Vec<Message>,
        _system: Option<String>,
        tools: Vec<ToolDefinition>,
        tool_choice: ToolCallMode,
    ) -> LlmResult<LlmResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((messages, tools, tool_choice));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Other {
                    message: "Scripted provider ran out of responses".to_string(),
                })
            })
    }
}

fn text_response(text: &str) -> LlmResult<LlmResponse> {
    Ok(LlmResponse {
        content: Some(text.to_string()),
        tool_calls: vec![],
        stop_reason: StopReason::EndTurn,
        usage: UsageStats::default(),
        model: "scripted-model".to_string(),
    })
}

fn tool_call_response(calls: Vec<(&str, &str, serde_json::Value)>) -> LlmResult<LlmResponse> {
    Ok(LlmResponse {
        content: None,
        tool_calls: calls
            .into_iter()
            .map(|(id, name, arguments)| ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })
            .collect(),
        stop_reason: StopReason::ToolUse,
        usage: UsageStats::default(),
        model: "scripted-model".to_string(),
    })
}

/// Shared preamble for mock python tool servers: a read loop plus
/// reply/fail helpers. Tests append their own `handle` function.
const MOCK_PRELUDE: &str = r#"
import json
import sys
import time

def reply(mid, result):
    print(json.dumps({"jsonrpc": "2.0", "id": mid, "result": result}), flush=True)

def fail(mid, code, message):
    print(json.dumps({"jsonrpc": "2.0", "id": mid, "error": {"code": code, "message": message}}), flush=True)

def init_result(name):
    return {
        "protocolVersion": "2024-11-05",
        "capabilities": {"tools": {}},
        "serverInfo": {"name": name, "version": "0.0.1"},
    }

def tool(name, description, properties):
    return {
        "name": name,
        "description": description,
        "inputSchema": {"type": "object", "properties": properties},
    }

def main(handle):
    for raw in sys.stdin:
        raw = raw.strip()
        if not raw:
            continue
        try:
            req = json.loads(raw)
        except ValueError:
            continue
        handle(req.get("method"), req.get("id"), req.get("params") or {})
"#;

/// Write a mock python3 tool server and return its launch config
fn mock_server(dir: &tempfile::TempDir, name: &str, handler: &str) -> ToolServerConfig {
    let script = format!("{MOCK_PRELUDE}\n{handler}\n\nmain(handle)\n");
    let script_path = dir.path().join(name);
    std::fs::write(&script_path, script).unwrap();
    ToolServerConfig::new(
        "mock-tools",
        "python3",
        vec![script_path.to_string_lossy().to_string()],
    )
}

/// Handler offering one `add` tool that sums its arguments
const CALC_HANDLER: &str = r#"
def handle(method, mid, params):
    if method == "initialize":
        reply(mid, init_result("calc"))
    elif method == "tools/list":
        reply(mid, {"tools": [tool(
            "add",
            "adds two numbers",
            {"a": {"type": "integer"}, "b": {"type": "integer"}},
        )]})
    elif method == "tools/call":
        args = params.get("arguments", {})
        total = args.get("a", 0) + args.get("b", 0)
        reply(mid, {"content": [{"type": "text", "text": str(total)}]})
"#;

/// Handler whose only tool always fails with an execution error
const FAILING_HANDLER: &str = r#"
def handle(method, mid, params):
    if method == "initialize":
        reply(mid, init_result("failing"))
    elif method == "tools/list":
        reply(mid, {"tools": [tool("divide", "divides two numbers", {})]})
    elif method == "tools/call":
        fail(mid, -32000, "division by zero")
"#;

/// Handler with a slow tool and a fast tool, for the ordering test
const LATENCY_HANDLER: &str = r#"
def handle(method, mid, params):
    if method == "initialize":
        reply(mid, init_result("latency"))
    elif method == "tools/list":
        reply(mid, {"tools": [tool("slow", "slow", {}), tool("fast", "fast", {})]})
    elif method == "tools/call":
        name = params.get("name", "")
        if name == "slow":
            time.sleep(0.7)
        reply(mid, {"content": [{"type": "text", "text": name + "-result"}]})
"#;

/// Handler that appends every tools/call name to a file
const RECORDING_HANDLER_TEMPLATE: &str = r#"
def handle(method, mid, params):
    if method == "initialize":
        reply(mid, init_result("recording"))
    elif method == "tools/list":
        reply(mid, {"tools": [tool("echo", "echoes", {"text": {"type": "string"}})]})
    elif method == "tools/call":
        with open("__CALL_LOG__", "a") as log:
            log.write(params.get("name", "") + "\n")
        reply(mid, {"content": [{"type": "text", "text": "echoed"}]})
"#;

/// Direct answer: the model's content comes back unmodified, and the
/// first request offered the catalog with tool choice auto.
#[tokio::test]
async fn test_direct_answer_passthrough() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "calc.py", CALC_HANDLER);
    let provider = ScriptedProvider::new(vec![text_response("You have no unread mail.")]);

    let mut assistant = Assistant::new(provider.clone(), server);
    assistant.connect().await.unwrap();

    let outcome = assistant.run_query("any unread mail?").await.unwrap();
    assistant.shutdown().await;

    assert_eq!(outcome.answer, "You have no unread mail.");
    // user turn + assistant turn
    assert_eq!(outcome.transcript.len(), 2);

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    let (messages, tools, tool_choice) = &requests[0];
    assert_eq!(messages.len(), 1);
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "add");
    assert_eq!(*tool_choice, ToolCallMode::Auto);
}

/// The end-to-end tool-calling scenario: one add call, result folded in,
/// final answer synthesized with tool use disabled.
#[tokio::test]
async fn test_single_tool_call_round() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "calc.py", CALC_HANDLER);
    let provider = ScriptedProvider::new(vec![
        tool_call_response(vec![("c1", "add", serde_json::json!({"a": 2, "b": 3}))]),
        text_response("The result is 5."),
    ]);

    let mut assistant = Assistant::new(provider.clone(), server);
    assistant.connect().await.unwrap();

    let outcome = assistant.run_query("what is 2+3?").await.unwrap();
    assistant.shutdown().await;

    assert_eq!(outcome.answer, "The result is 5.");
    // user, assistant-with-call, tool, assistant-final
    assert_eq!(outcome.transcript.len(), 4);

    match &outcome.transcript[1].content[0] {
        MessageContent::ToolUse { id, name, input } => {
            assert_eq!(id, "c1");
            assert_eq!(name, "add");
            assert_eq!(input["a"], 2);
        }
        other => panic!("Expected ToolUse block, got {:?}", other),
    }

    match &outcome.transcript[2].content[0] {
        MessageContent::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            assert_eq!(tool_use_id, "c1");
            assert_eq!(content, "5");
            assert!(is_error.is_none());
        }
        other => panic!("Expected ToolResult block, got {:?}", other),
    }

    assert_eq!(outcome.transcript[3].role, MessageRole::Assistant);

    // The final request carried the whole transcript and disabled tools
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].0.len(), 3);
    assert_eq!(requests[1].2, ToolCallMode::None);
}

/// A tool execution failure becomes the tool turn's content and the run
/// still completes.
#[tokio::test]
async fn test_tool_execution_error_is_folded_in() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "failing.py", FAILING_HANDLER);
    let provider = ScriptedProvider::new(vec![
        tool_call_response(vec![("c1", "divide", serde_json::json!({"a": 1, "b": 0}))]),
        text_response("That division failed: division by zero."),
    ]);

    let mut assistant = Assistant::new(provider.clone(), server);
    assistant.connect().await.unwrap();

    let outcome = assistant.run_query("divide 1 by 0").await.unwrap();
    assistant.shutdown().await;

    assert_eq!(outcome.answer, "That division failed: division by zero.");

    match &outcome.transcript[2].content[0] {
        MessageContent::ToolResult {
            content, is_error, ..
        } => {
            assert_eq!(content, "division by zero");
            assert_eq!(*is_error, Some(true));
        }
        other => panic!("Expected ToolResult block, got {:?}", other),
    }
}

/// A request for a tool outside the catalog never reaches the session and
/// synthesizes a "not available" tool turn.
#[tokio::test]
async fn test_unknown_tool_never_reaches_session() {
    let temp = tempfile::tempdir().unwrap();
    let call_log = temp.path().join("calls.log");
    let script =
        RECORDING_HANDLER_TEMPLATE.replace("__CALL_LOG__", &call_log.to_string_lossy());
    let server = mock_server(&temp, "recording.py", &script);

    let provider = ScriptedProvider::new(vec![
        tool_call_response(vec![
            ("c1", "delete_everything", serde_json::json!({})),
            ("c2", "echo", serde_json::json!({"text": "hi"})),
        ]),
        text_response("Done."),
    ]);

    let mut assistant = Assistant::new(provider.clone(), server);
    assistant.connect().await.unwrap();

    let outcome = assistant.run_query("please echo hi").await.unwrap();
    assistant.shutdown().await;

    assert_eq!(outcome.answer, "Done.");

    match &outcome.transcript[2].content[0] {
        MessageContent::ToolResult {
            content, is_error, ..
        } => {
            assert_eq!(content, "Tool 'delete_everything' is not available");
            assert_eq!(*is_error, Some(true));
        }
        other => panic!("Expected ToolResult block, got {:?}", other),
    }

    // Only the catalog member was actually invoked
    let log = std::fs::read_to_string(&call_log).unwrap_or_default();
    let called: Vec<&str> = log.lines().collect();
    assert_eq!(called, vec!["echo"]);
}

/// Tool turns appear in request order even when the first call finishes
/// last.
#[tokio::test]
async fn test_tool_turn_ordering_under_latency() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "latency.py", LATENCY_HANDLER);
    let provider = ScriptedProvider::new(vec![
        tool_call_response(vec![
            ("c1", "slow", serde_json::json!({})),
            ("c2", "fast", serde_json::json!({})),
        ]),
        text_response("Both done."),
    ]);

    let mut assistant = Assistant::new(provider.clone(), server);
    assistant.connect().await.unwrap();

    let outcome = assistant.run_query("run both").await.unwrap();
    assistant.shutdown().await;

    let tool_turns: Vec<(&str, &str)> = outcome
        .transcript
        .iter()
        .flat_map(|m| &m.content)
        .filter_map(|c| match c {
            MessageContent::ToolResult {
                tool_use_id,
                content,
                ..
            } => Some((tool_use_id.as_str(), content.as_str())),
            _ => None,
        })
        .collect();

    assert_eq!(
        tool_turns,
        vec![("c1", "slow-result"), ("c2", "fast-result")]
    );
}

/// Null content with no tool calls yields an empty answer, not a crash.
#[tokio::test]
async fn test_null_content_yields_empty_answer() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "calc.py", CALC_HANDLER);
    let provider = ScriptedProvider::new(vec![Ok(LlmResponse {
        content: None,
        tool_calls: vec![],
        stop_reason: StopReason::EndTurn,
        usage: UsageStats::default(),
        model: "scripted-model".to_string(),
    })]);

    let mut assistant = Assistant::new(provider, server);
    assistant.connect().await.unwrap();

    let answer = assistant.answer_query("hm").await.unwrap();
    assistant.shutdown().await;
    assert_eq!(answer, "");
}

/// A gateway failure aborts the run and releases the session.
#[tokio::test]
async fn test_model_gateway_error_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "calc.py", CALC_HANDLER);
    let provider = ScriptedProvider::new(vec![Err(LlmError::ServerError {
        message: "upstream exploded".to_string(),
        status: Some(502),
    })]);

    let mut assistant = Assistant::new(provider, server);
    assistant.connect().await.unwrap();

    let err = assistant.answer_query("anything").await.unwrap_err();
    assert!(matches!(err, AppError::ModelGateway(_)));
    assert!(!assistant.is_connected());
}

/// connect and shutdown are idempotent, and a fresh connect after
/// shutdown works.
#[tokio::test]
async fn test_connect_shutdown_lifecycle() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "calc.py", CALC_HANDLER);
    let provider = ScriptedProvider::new(vec![
        text_response("first"),
        text_response("second"),
    ]);

    let mut assistant = Assistant::new(provider, server);

    assistant.connect().await.unwrap();
    assistant.connect().await.unwrap();
    assert!(assistant.is_connected());

    assert_eq!(assistant.answer_query("one").await.unwrap(), "first");

    assistant.shutdown().await;
    assistant.shutdown().await;
    assert!(!assistant.is_connected());

    assistant.connect().await.unwrap();
    assert_eq!(assistant.answer_query("two").await.unwrap(), "second");
    assistant.shutdown().await;
}

/// Cancelling mid-run fails the query and still releases the session.
#[tokio::test]
async fn test_cancellation_releases_session() {
    let temp = tempfile::tempdir().unwrap();
    let server = mock_server(&temp, "latency.py", LATENCY_HANDLER);
    let provider = ScriptedProvider::new(vec![tool_call_response(vec![(
        "c1",
        "slow",
        serde_json::json!({}),
    )])]);

    let mut assistant = Assistant::new(provider, server);
    assistant.connect().await.unwrap();

    let cancel = assistant.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let err = assistant.answer_query("run the slow one").await.unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)));
    assert!(!assistant.is_connected());
}
