//! Telegram transport settings.

use autoaccept_core::PipelineSettings;
use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// User id of the owner, who is always authorized.
    pub admin_chat_id: i64,
    /// Where unauthorized users can ask for access, shown by `/start`.
    pub access_contact: Option<String>,
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        autoaccept_core::config::build_config()?.try_deserialize()
    }

    /// Contact hint with surrounding whitespace removed, if configured.
    #[must_use]
    pub fn access_contact(&self) -> Option<&str> {
        self.access_contact
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Pipeline settings shared with the runtime.
    pub pipeline: Arc<PipelineSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(pipeline: PipelineSettings, telegram: TelegramSettings) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            telegram: Arc::new(telegram),
        }
    }
}
