//! duobot-ledger - Bookkeeping for the ledger bot
//!
//! Parses chat messages into ledger commands, keeps per-user preferences
//! in memory and persists deposit/withdrawal records in SQLite.

pub mod calc;
pub mod command;
pub mod error;
pub mod preferences;
pub mod service;
pub mod store;
pub mod types;

pub use command::LedgerCommand;
pub use error::{LedgerError, Result};
pub use preferences::{PreferenceStore, UserPreferences, UserTimezone};
pub use service::Ledger;
pub use store::LedgerStore;
pub use types::{LedgerRecord, RecordKind};
