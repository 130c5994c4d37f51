//! duobot-core: shared core of the duobot chat bots
//!
//! Provides the LLM completion client, configuration loading and the
//! per-participant conversation session store used by the assistant bot.

pub mod config;
pub mod error;
pub mod llm;
pub mod session;

pub use config::{Config, LedgerConfig, LlmConfig, LlmProvider, SessionConfig, TelegramConfig};
pub use error::{Error, Result};
pub use llm::{CompletionService, LlmClient, Message, MessageContent};
pub use session::{
    ClearStatus, Clock, ManualClock, Role, Session, SessionFacade, SessionStore, SessionSweeper,
    SweeperHandle, SystemClock, Turn,
};
