//! JSON Configuration Management
//!
//! Handles reading and writing the application configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::services::llm::types::ProviderConfig;
use crate::services::tools::session::ToolServerConfig;
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_courier_dir};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// How to launch the tool server. An empty command means "spawn the
    /// current executable with serve-tools".
    #[serde(default = "default_tool_server")]
    pub tool_server: ToolServerConfig,
    /// Database file override; defaults to ~/.courier/data.db
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

fn default_tool_server() -> ToolServerConfig {
    ToolServerConfig::new("courier-mailbox", "", vec![])
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            tool_server: default_tool_server(),
            database_path: None,
        }
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.model.trim().is_empty() {
            return Err("Provider model must not be empty".to_string());
        }
        if self.provider.max_tokens == 0 {
            return Err("max_tokens must be positive".to_string());
        }
        Ok(())
    }
}

/// Configuration service for managing app settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigService {
    /// Create a config service at the default location, loading existing
    /// config or writing defaults on first run.
    pub fn new() -> AppResult<Self> {
        ensure_courier_dir()?;
        Self::at(&config_path()?)
    }

    /// Create a config service backed by a specific file
    pub fn at(path: &Path) -> AppResult<Self> {
        let config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            let default_config = AppConfig::default();
            Self::save_to_file(path, &default_config)?;
            default_config
        };

        let mut service = Self {
            config_path: path.to_path_buf(),
            config,
        };
        service.apply_env_overrides();
        Ok(service)
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<AppConfig> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &AppConfig) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// The environment wins over the stored API key
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.config.provider.api_key = Some(key);
            }
        }
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }
}
