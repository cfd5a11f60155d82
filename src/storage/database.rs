//! SQLite Database
//!
//! Embedded database for persistent storage using rusqlite with r2d2 connection pooling.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::models::{Delivery, InboxEntry, Message, MessageWithRecipients, User};
use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service for managing SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) a database at the given path
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    ///
    /// Uses an in-memory SQLite database with the same schema as the
    /// production database. Useful for integration and unit tests.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                subject TEXT,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (sender_id) REFERENCES users(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS message_recipients (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                read_at TEXT,
                UNIQUE(message_id, recipient_id),
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE,
                FOREIGN KEY (recipient_id) REFERENCES users(id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_sender_id ON messages(sender_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recipients_recipient_id
             ON message_recipients(recipient_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recipients_unread
             ON message_recipients(recipient_id, read)",
            [],
        )?;

        // Must be set per-connection in SQLite
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        Ok(())
    }

    /// Get a pooled connection
    pub fn get_connection(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Insert a new user
    pub fn insert_user(&self, user: &User) -> AppResult<()> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO users (id, email, name, created_at)
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)",
            params![user.id, user.email, user.name],
        )?;
        Ok(())
    }

    /// Get a user by id
    pub fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            "SELECT id, email, name, created_at FROM users WHERE id = ?1",
            params![id],
            Self::row_to_user,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::database(e.to_string())),
        }
    }

    /// Get a user by email
    pub fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            "SELECT id, email, name, created_at FROM users WHERE email = ?1",
            params![email],
            Self::row_to_user,
        );

        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::database(e.to_string())),
        }
    }

    /// List all users
    pub fn list_users(&self) -> AppResult<Vec<User>> {
        let conn = self.get_connection()?;
        let mut stmt =
            conn.prepare("SELECT id, email, name, created_at FROM users ORDER BY name ASC")?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(users)
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Insert a message and one delivery row per recipient, atomically
    pub fn insert_message(&self, message: &Message, recipients: &[String]) -> AppResult<()> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO messages (id, sender_id, subject, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.sender_id,
                message.subject,
                message.content,
                message.timestamp,
            ],
        )?;

        for recipient_id in recipients {
            tx.execute(
                "INSERT INTO message_recipients (id, message_id, recipient_id, read)
                 VALUES (?1, ?2, ?3, 0)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    message.id,
                    recipient_id,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a message by id
    pub fn get_message(&self, id: &str) -> AppResult<Option<Message>> {
        let conn = self.get_connection()?;
        let result = conn.query_row(
            "SELECT id, sender_id, subject, content, timestamp FROM messages WHERE id = ?1",
            params![id],
            Self::row_to_message,
        );

        match result {
            Ok(message) => Ok(Some(message)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::database(e.to_string())),
        }
    }

    /// List all messages sent by a user, newest first
    pub fn list_sent_messages(&self, sender_id: &str) -> AppResult<Vec<Message>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, sender_id, subject, content, timestamp
             FROM messages WHERE sender_id = ?1
             ORDER BY timestamp DESC",
        )?;

        let messages = stmt
            .query_map(params![sender_id], Self::row_to_message)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(messages)
    }

    /// List the inbox of a user: every delivery addressed to them with the
    /// message embedded, newest first
    pub fn list_inbox(&self, user_id: &str) -> AppResult<Vec<InboxEntry>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT r.recipient_id, r.message_id, r.read, r.read_at,
                    m.id, m.sender_id, m.subject, m.content, m.timestamp
             FROM message_recipients r
             LEFT JOIN messages m ON m.id = r.message_id
             WHERE r.recipient_id = ?1
             ORDER BY m.timestamp DESC",
        )?;

        let entries = stmt
            .query_map(params![user_id], |row| {
                let message_id: Option<String> = row.get(4)?;
                let message = match message_id {
                    Some(id) => Some(Message {
                        id,
                        sender_id: row.get(5)?,
                        subject: row.get(6)?,
                        content: row.get(7)?,
                        timestamp: row.get(8)?,
                    }),
                    None => None,
                };
                Ok(InboxEntry {
                    recipient_id: row.get(0)?,
                    message_id: row.get(1)?,
                    read: row.get::<_, i32>(2)? != 0,
                    read_at: row.get(3)?,
                    message,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    /// List unread deliveries for a recipient
    pub fn list_unread(&self, recipient_id: &str) -> AppResult<Vec<Delivery>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, recipient_id, read, read_at
             FROM message_recipients
             WHERE recipient_id = ?1 AND read = 0",
        )?;

        let deliveries = stmt
            .query_map(params![recipient_id], Self::row_to_delivery)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(deliveries)
    }

    /// Get a message together with all of its delivery records
    pub fn get_message_with_recipients(
        &self,
        message_id: &str,
    ) -> AppResult<MessageWithRecipients> {
        let message = self.get_message(message_id)?;

        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, recipient_id, read, read_at
             FROM message_recipients WHERE message_id = ?1",
        )?;

        let recipients = stmt
            .query_map(params![message_id], Self::row_to_delivery)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(MessageWithRecipients {
            message,
            recipients,
        })
    }

    /// Mark a delivery as read and return the updated record.
    ///
    /// Returns `None` when no delivery exists for the pair.
    pub fn mark_as_read(&self, message_id: &str, recipient_id: &str) -> AppResult<Option<Delivery>> {
        let conn = self.get_connection()?;
        conn.execute(
            "UPDATE message_recipients
             SET read = 1, read_at = CURRENT_TIMESTAMP
             WHERE message_id = ?1 AND recipient_id = ?2",
            params![message_id, recipient_id],
        )?;

        let result = conn.query_row(
            "SELECT message_id, recipient_id, read, read_at
             FROM message_recipients
             WHERE message_id = ?1 AND recipient_id = ?2",
            params![message_id, recipient_id],
            Self::row_to_delivery,
        );

        match result {
            Ok(delivery) => Ok(Some(delivery)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::database(e.to_string())),
        }
    }

    // ========================================================================
    // Row mappers
    // ========================================================================

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            subject: row.get(2)?,
            content: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }

    fn row_to_delivery(row: &rusqlite::Row) -> rusqlite::Result<Delivery> {
        Ok(Delivery {
            message_id: row.get(0)?,
            recipient_id: row.get(1)?,
            read: row.get::<_, i32>(2)? != 0,
            read_at: row.get(3)?,
        })
    }
}
