//! Configuration management
//!
//! Settings are read with the following precedence:
//! 1. Environment variables
//! 2. `duobot.toml` configuration file
//! 3. Default values
//!
//! Inside the configuration file `${VAR_NAME}` is replaced by the value of
//! the environment variable.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "duobot.toml";

/// LLM Provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API
    #[default]
    Claude,
    /// OpenAI-compatible API (GLM, etc.)
    #[serde(alias = "glm", alias = "zai", alias = "minimax")]
    OpenAi,
}

impl LlmProvider {
    /// Parse a provider name; anything unknown means Claude
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "openai" | "glm" | "zai" | "minimax" => LlmProvider::OpenAi,
            _ => LlmProvider::Claude,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Claude => "https://api.anthropic.com/v1",
            LlmProvider::OpenAi => "https://api.openai.com/v1",
        }
    }
}

/// `[llm]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API key
    pub api_key: String,
    /// Model to use
    pub model: String,
    /// API provider
    pub provider: LlmProvider,
    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,
    /// Upper bound on reply tokens
    pub max_tokens: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            provider: LlmProvider::Claude,
            base_url: None,
            max_tokens: 2048,
        }
    }
}

/// `[telegram]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Token of the assistant bot; the bot is disabled when unset
    pub assistant_token: Option<String>,
    /// Token of the ledger bot; the bot is disabled when unset
    pub ledger_token: Option<String>,
    /// Users allowed to talk to the bots. Empty means everyone.
    pub allowed_user_ids: Vec<i64>,
}

/// `[session]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Turns retained per participant
    pub window_size: usize,
    /// Inactivity after which a session is evicted
    pub idle_timeout_secs: u64,
    /// Pause between background sweeps; must not exceed the idle timeout
    pub sweep_interval_secs: u64,
    /// Bound on a single completion call
    pub completion_timeout_secs: u64,
    /// Reply sent when the completion service is unavailable
    pub fallback_reply: String,
    /// System prompt sent with every completion request
    pub system_prompt: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            idle_timeout_secs: 3600,
            sweep_interval_secs: 300,
            completion_timeout_secs: 60,
            fallback_reply: crate::session::DEFAULT_FALLBACK_REPLY.to_string(),
            system_prompt: Some(
                "You are a helpful assistant. Respond in the same language as the user's question. \
                 Be concise and helpful."
                    .to_string(),
            ),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}

/// `[ledger]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Currency used until a user picks one
    pub default_currency: String,
    /// Exchange rate used until a user sets one
    pub default_exchange_rate: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: "data/ledger.db".to_string(),
            default_currency: "CNY".to_string(),
            default_exchange_rate: 1.0,
        }
    }
}

/// Main configuration for duobot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub telegram: TelegramConfig,
    pub session: SessionConfig,
    pub ledger: LedgerConfig,
}

impl Config {
    /// Replace `${VAR_NAME}` with the variable's value; unset variables
    /// expand to an empty string
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    if let Ok(env_value) = std::env::var(name) {
                        result.push_str(&env_value);
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    // unterminated: keep the text as written
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        result.push_str(rest);
        result
    }

    /// Parse TOML text, expanding environment variables first
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load a TOML configuration file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `duobot.toml` if present, otherwise from the environment,
    /// and validate the result
    pub fn load() -> Result<Self> {
        let config = if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_toml_file(DEFAULT_CONFIG_FILE)?
        } else {
            Self::from_env()
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup; empty values are ignored
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // LLM
        if let Some(key) = var("LLM_API_KEY").or_else(|| var("CLAUDE_API_KEY")) {
            self.llm.api_key = key;
        }
        if let Some(model) = var("LLM_MODEL").or_else(|| var("CLAUDE_MODEL")) {
            self.llm.model = model;
        }
        if let Some(provider) = var("LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&provider);
        }
        if let Some(base_url) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        // Telegram
        if let Some(token) = var("ASSISTANT_BOT_TOKEN") {
            self.telegram.assistant_token = Some(token);
        }
        if let Some(token) = var("LEDGER_BOT_TOKEN") {
            self.telegram.ledger_token = Some(token);
        }
        if let Some(ids) = var("ALLOWED_USER_IDS") {
            self.telegram.allowed_user_ids = ids
                .split(',')
                .filter_map(|id| {
                    let id = id.trim();
                    let parsed = id.parse().ok();
                    if parsed.is_none() && !id.is_empty() {
                        warn!("Ignoring invalid user id in ALLOWED_USER_IDS: {}", id);
                    }
                    parsed
                })
                .collect();
        }

        // Session
        if let Some(v) = var("SESSION_WINDOW_SIZE") {
            parse_into("SESSION_WINDOW_SIZE", &v, &mut self.session.window_size);
        }
        if let Some(v) = var("SESSION_IDLE_TIMEOUT_SECS") {
            parse_into("SESSION_IDLE_TIMEOUT_SECS", &v, &mut self.session.idle_timeout_secs);
        }
        if let Some(v) = var("SESSION_SWEEP_INTERVAL_SECS") {
            parse_into("SESSION_SWEEP_INTERVAL_SECS", &v, &mut self.session.sweep_interval_secs);
        }
        if let Some(v) = var("COMPLETION_TIMEOUT_SECS") {
            parse_into("COMPLETION_TIMEOUT_SECS", &v, &mut self.session.completion_timeout_secs);
        }

        // Ledger
        if let Some(path) = var("LEDGER_DB_PATH") {
            self.ledger.db_path = path;
        }
        if let Some(currency) = var("LEDGER_DEFAULT_CURRENCY") {
            self.ledger.default_currency = currency;
        }
    }

    /// Reject settings the bots cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.window_size == 0 {
            return Err(Error::Config("session.window_size must be at least 1".to_string()));
        }
        if self.session.idle_timeout_secs == 0 {
            return Err(Error::Config("session.idle_timeout_secs must be at least 1".to_string()));
        }
        if self.session.sweep_interval_secs == 0
            || self.session.sweep_interval_secs > self.session.idle_timeout_secs
        {
            return Err(Error::Config(format!(
                "session.sweep_interval_secs must be between 1 and idle_timeout_secs ({})",
                self.session.idle_timeout_secs
            )));
        }
        if self.session.completion_timeout_secs == 0 {
            return Err(Error::Config(
                "session.completion_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.telegram.assistant_token.is_some() && self.llm.api_key.is_empty() {
            return Err(Error::Config(
                "LLM_API_KEY is required when the assistant bot is enabled".to_string(),
            ));
        }
        if !(self.ledger.default_exchange_rate.is_finite() && self.ledger.default_exchange_rate > 0.0) {
            return Err(Error::Config(
                "ledger.default_exchange_rate must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_into<T: std::str::FromStr>(name: &str, value: &str, target: &mut T) {
    match value.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!("Ignoring invalid value for {}: {}", name, value),
    }
}
