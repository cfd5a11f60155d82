//! Mailbox Service
//!
//! Business operations over the mail store: users, messages and
//! per-recipient read-state. This is the functionality the tool server
//! exposes to the assistant.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    CreateUserRequest, Delivery, InboxEntry, Message, MessageWithRecipients, SendMessageRequest,
    User,
};
use crate::storage::database::Database;
use crate::utils::error::{AppError, AppResult};

/// Service for mailbox operations
#[derive(Clone)]
pub struct MailboxService {
    db: Database,
}

impl MailboxService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new user
    pub fn create_user(&self, request: &CreateUserRequest) -> AppResult<User> {
        request.validate().map_err(AppError::validation)?;

        if self.db.get_user_by_email(&request.email)?.is_some() {
            return Err(AppError::validation(format!(
                "A user with email '{}' already exists",
                request.email
            )));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            email: request.email.clone(),
            name: request.name.clone(),
            created_at: None,
        };
        self.db.insert_user(&user)?;

        // Re-read for the database-assigned timestamp
        self.db
            .get_user(&user.id)?
            .ok_or_else(|| AppError::internal("User vanished after insert"))
    }

    /// Get a user by email
    pub fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.db.get_user_by_email(email)
    }

    /// Retrieve all users
    pub fn get_all_users(&self) -> AppResult<Vec<User>> {
        self.db.list_users()
    }

    /// Send a message to one or more recipients
    pub fn send_message(&self, request: &SendMessageRequest) -> AppResult<Message> {
        request.validate().map_err(AppError::validation)?;

        if self.db.get_user(&request.sender_id)?.is_none() {
            return Err(AppError::validation(format!(
                "Unknown sender: {}",
                request.sender_id
            )));
        }
        for recipient_id in &request.recipients {
            if self.db.get_user(recipient_id)?.is_none() {
                return Err(AppError::validation(format!(
                    "Unknown recipient: {}",
                    recipient_id
                )));
            }
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: request.sender_id.clone(),
            subject: request.subject.clone(),
            content: request.content.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.db.insert_message(&message, &request.recipients)?;

        Ok(message)
    }

    /// View all messages sent by a user
    pub fn get_all_sent_message(&self, sender_id: &str) -> AppResult<Vec<Message>> {
        self.db.list_sent_messages(sender_id)
    }

    /// View inbox messages of a user
    pub fn view_inbox(&self, user_id: &str) -> AppResult<Vec<InboxEntry>> {
        self.db.list_inbox(user_id)
    }

    /// View unread messages for a recipient
    pub fn get_unread_message(&self, recipient_id: &str) -> AppResult<Vec<Delivery>> {
        self.db.list_unread(recipient_id)
    }

    /// View a message with all its recipients
    pub fn get_message_with_recipients(
        &self,
        message_id: &str,
    ) -> AppResult<MessageWithRecipients> {
        let result = self.db.get_message_with_recipients(message_id)?;
        if result.message.is_none() {
            return Err(AppError::not_found(format!(
                "No message with id '{}'",
                message_id
            )));
        }
        Ok(result)
    }

    /// Mark a message as read for a recipient
    pub fn mark_as_read(&self, message_id: &str, recipient_id: &str) -> AppResult<Delivery> {
        self.db
            .mark_as_read(message_id, recipient_id)?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "No delivery of message '{}' to recipient '{}'",
                    message_id, recipient_id
                ))
            })
    }
}
