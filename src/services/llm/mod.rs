//! Model Gateway Module
//!
//! The thin request/response client to the language-model API.

pub mod openai;
pub mod provider;
pub mod types;

// Re-export main types
pub use openai::OpenAIProvider;
pub use provider::LlmProvider;
pub use types::*;
