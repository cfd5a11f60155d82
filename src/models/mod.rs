//! Data Models
//!
//! Contains all data structures used throughout the application.

pub mod message;
pub mod user;

pub use message::*;
pub use user::*;
