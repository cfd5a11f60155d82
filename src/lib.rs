//! Courier - Messaging Service with a Tool-Calling AI Assistant
//!
//! This library provides:
//! - A mail store (users, messages, per-recipient read-state) over SQLite
//! - A stdio tool server exposing the mailbox operations as callable tools
//! - An assistant that spawns the tool server, offers its tools to a
//!   language model and orchestrates tool-calling conversations

pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export commonly used items
pub use services::assistant::{Assistant, QueryOutcome};
pub use services::llm::{LlmProvider, OpenAIProvider};
pub use services::mailbox::MailboxService;
pub use services::tool_server::ToolServer;
pub use services::tools::{ToolCatalog, ToolServerConfig, ToolSession};
pub use storage::config::{AppConfig, ConfigService};
pub use storage::database::Database;
pub use utils::error::{AppError, AppResult};
