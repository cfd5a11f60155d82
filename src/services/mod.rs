//! Services
//!
//! Business logic services for the application.

pub mod assistant;
pub mod llm;
pub mod mailbox;
pub mod tool_server;
pub mod tools;

pub use assistant::{Assistant, QueryOutcome};
pub use mailbox::MailboxService;
pub use tool_server::ToolServer;
