//! duobot-telegram: Telegram front ends
//!
//! Two independent bots share this crate: the assistant bot, which relays
//! conversations to the LLM through the session facade, and the ledger
//! bot, which records deposits and withdrawals.

pub mod assistant;
pub mod common;
pub mod error;
pub mod ledger;

pub use assistant::{AssistantBot, AssistantState};
pub use error::{Result, TelegramError};
pub use ledger::{LedgerBot, LedgerState};
