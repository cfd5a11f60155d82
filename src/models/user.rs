//! User Models
//!
//! Data models for user accounts.

use serde::{Deserialize, Serialize};

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUID string)
    pub id: String,
    /// Email address, unique across users
    pub email: String,
    /// Display name
    pub name: String,
    /// When the user was created
    pub created_at: Option<String>,
}

/// Request to create a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

impl CreateUserRequest {
    /// Validate the request
    pub fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("Email is required".to_string());
        }
        if !self.email.contains('@') {
            return Err(format!("Invalid email address: {}", self.email));
        }
        if self.name.trim().is_empty() {
            return Err("Name is required".to_string());
        }
        Ok(())
    }
}
