//! Ledger error types

use thiserror::Error;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid exchange rate: {0}")]
    InvalidRate(String),

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger store lock poisoned")]
    Lock,
}

impl LedgerError {
    /// Reply shown to the chat user
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::InvalidAmount(_) => "请提供一个有效的金额。".to_string(),
            LedgerError::InvalidRate(_) => "请提供一个有效的汇率。".to_string(),
            LedgerError::InvalidCurrency(_) => "请提供一个有效的币种。".to_string(),
            LedgerError::InvalidTimezone(_) => {
                "请提供一个有效的时区，例如 Asia/Shanghai、+08:00 或 UTC。".to_string()
            }
            LedgerError::InvalidExpression(detail) => format!("计算错误：{}", detail),
            LedgerError::MissingArgument("timestamp") => "请提供一个有效的时间戳。".to_string(),
            LedgerError::MissingArgument(name) => format!("缺少参数：{}", name),
            LedgerError::Database(_) | LedgerError::Io(_) | LedgerError::Lock => {
                "账本暂时不可用，请稍后再试。".to_string()
            }
        }
    }
}

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
