//! Tool Session Module
//!
//! The client side of the tool-server boundary: the stdio session, the
//! catalog adapter and schema sanitizing.

pub mod catalog;
pub mod schema;
pub mod session;

pub use catalog::ToolCatalog;
pub use session::{ContentPart, ToolCallResult, ToolInfo, ToolServerConfig, ToolSession};
