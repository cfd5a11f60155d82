//! Message Models
//!
//! Data models for messages and their per-recipient delivery records.

use serde::{Deserialize, Serialize};

/// A message stored in the mail store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (UUID string)
    pub id: String,
    /// Id of the sending user
    pub sender_id: String,
    /// Optional subject line
    pub subject: Option<String>,
    /// Message body
    pub content: String,
    /// When the message was sent
    pub timestamp: String,
}

/// Per-recipient delivery record carrying the read-state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub message_id: String,
    pub recipient_id: String,
    pub read: bool,
    pub read_at: Option<String>,
}

/// Request to send a message to one or more recipients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender_id: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
}

impl SendMessageRequest {
    /// Validate the request
    pub fn validate(&self) -> Result<(), String> {
        if self.sender_id.trim().is_empty() {
            return Err("Sender id is required".to_string());
        }
        if self.recipients.is_empty() {
            return Err("At least one recipient is required".to_string());
        }
        if self.recipients.iter().any(|r| r.trim().is_empty()) {
            return Err("Recipient ids must not be empty".to_string());
        }
        if self.content.is_empty() {
            return Err("Message content is required".to_string());
        }
        Ok(())
    }
}

/// An inbox entry: a delivery record with its message embedded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub recipient_id: String,
    pub message_id: String,
    pub read: bool,
    pub read_at: Option<String>,
    pub message: Option<Message>,
}

/// A message together with all of its delivery records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageWithRecipients {
    pub message: Option<Message>,
    pub recipients: Vec<Delivery>,
}
