//! Tool Server Integration Tests
//!
//! Drives the JSON-RPC server over an in-memory duplex pipe the way the
//! assistant's session drives it over child stdio.

use courier::services::mailbox::MailboxService;
use courier::services::tool_server::ToolServer;
use courier::storage::database::Database;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};

struct PipeClient {
    reader: BufReader<ReadHalf<tokio::io::DuplexStream>>,
    writer: WriteHalf<tokio::io::DuplexStream>,
    next_id: u64,
}

impl PipeClient {
    fn start() -> (Self, tokio::task::JoinHandle<()>) {
        let server = ToolServer::new(MailboxService::new(Database::new_in_memory().unwrap()));
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, client_write) = tokio::io::split(client_io);

        let handle = tokio::spawn(async move {
            let _ = server.serve(server_read, server_write).await;
        });

        (
            Self {
                reader: BufReader::new(client_read),
                writer: client_write,
                next_id: 1,
            },
            handle,
        )
    }

    async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;

        let line = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        })
        .to_string();
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();

        let mut response_line = String::new();
        self.reader.read_line(&mut response_line).await.unwrap();
        let response: Value = serde_json::from_str(&response_line).unwrap();
        assert_eq!(response["id"], id);
        response
    }

    /// Call a tool and parse the JSON carried in its first text block
    async fn call_tool(&mut self, name: &str, arguments: Value) -> Value {
        let response = self
            .request(
                "tools/call",
                serde_json::json!({"name": name, "arguments": arguments}),
            )
            .await;
        assert!(
            response.get("error").is_none(),
            "unexpected rpc error: {}",
            response
        );
        assert!(response["result"]["isError"].as_bool() != Some(true));
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(text).unwrap()
    }

    async fn initialize(&mut self) {
        let response = self.request("initialize", serde_json::json!({})).await;
        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");

        // Notification: no response expected
        self.writer
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\",\"params\":{}}\n",
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_messaging_session_over_pipe() {
    let (mut client, _server) = PipeClient::start();
    client.initialize().await;

    // The advertised catalog carries all nine tools
    let response = client.request("tools/list", serde_json::json!({})).await;
    let tools = response["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 9);

    // Create two users
    let ada = client
        .call_tool(
            "create_user",
            serde_json::json!({"email": "ada@example.com", "name": "Ada"}),
        )
        .await;
    let bob = client
        .call_tool(
            "create_user",
            serde_json::json!({"email": "bob@example.com", "name": "Bob"}),
        )
        .await;

    // Send a message and walk the views
    let message = client
        .call_tool(
            "send_message",
            serde_json::json!({
                "sender_id": ada["id"],
                "recipients": [bob["id"]],
                "subject": "hi",
                "content": "hello bob"
            }),
        )
        .await;

    let inbox = client
        .call_tool("view_inbox", serde_json::json!({"user_id": bob["id"]}))
        .await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["message"]["content"], "hello bob");

    let unread = client
        .call_tool(
            "get_unread_message",
            serde_json::json!({"recipient_id": bob["id"]}),
        )
        .await;
    assert_eq!(unread.as_array().unwrap().len(), 1);

    let delivery = client
        .call_tool(
            "mark_as_read",
            serde_json::json!({"message_id": message["id"], "recipient_id": bob["id"]}),
        )
        .await;
    assert_eq!(delivery["read"], true);

    let unread = client
        .call_tool(
            "get_unread_message",
            serde_json::json!({"recipient_id": bob["id"]}),
        )
        .await;
    assert!(unread.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_tool_failures_are_data() {
    let (mut client, _server) = PipeClient::start();
    client.initialize().await;

    // Business failure: isError result, conversation-safe
    let response = client
        .request(
            "tools/call",
            serde_json::json!({
                "name": "send_message",
                "arguments": {
                    "sender_id": "ghost",
                    "recipients": ["ghost2"],
                    "content": "boo"
                }
            }),
        )
        .await;
    assert_eq!(response["result"]["isError"], true);
    assert!(response["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("Unknown sender"));

    // Unknown tool: JSON-RPC error
    let response = client
        .request(
            "tools/call",
            serde_json::json!({"name": "drop_tables", "arguments": {}}),
        )
        .await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_garbage_lines_are_skipped() {
    let (mut client, _server) = PipeClient::start();

    // Non-JSON noise on the wire must not kill the server
    client.writer.write_all(b"this is not json\n").await.unwrap();
    client.writer.write_all(b"\n").await.unwrap();

    client.initialize().await;
    let response = client.request("tools/list", serde_json::json!({})).await;
    assert!(response["result"]["tools"].is_array());
}
