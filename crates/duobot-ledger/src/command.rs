//! Ledger command parsing
//!
//! Chat text is matched against keyword prefixes (Chinese or English),
//! signed amounts such as `+100u`, and bare arithmetic. Text that matches
//! nothing is not a ledger command and is ignored by the bot.

use std::sync::LazyLock;

use regex::Regex;

use crate::calc::looks_like_arithmetic;
use crate::preferences::{parse_timezone, UserTimezone};
use crate::{LedgerError, Result};

/// Currency recorded for amounts with the `u` suffix
pub const USDT: &str = "USDT";

static SIGNED_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-])\s*(\d+(?:\.\d+)?)\s*([uU])?$").unwrap());

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)\s*([uU])?$").unwrap());

static CURRENCY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{2,10}$").unwrap());

const HELP: &[&str] = &["/start", "/help", "帮助", "help"];
const ADD: &[&str] = &["/add"];
const SUBTRACT: &[&str] = &["/sub", "下拨"];
const VIEW: &[&str] = &["/bill", "账单", "bill"];
const SUMMARY: &[&str] = &["/summary", "汇总", "summary"];
const DELETE: &[&str] = &["/delete", "删除", "delete"];
const RATE: &[&str] = &["/rate", "设置汇率", "汇率", "rate"];
const CURRENCY_KEYWORDS: &[&str] = &["/currency", "币种", "currency"];
const TIMEZONE: &[&str] = &["/timezone", "设置时区", "时区", "timezone"];
const CLEAR: &[&str] = &["/clear", "清除", "clear"];
const COMPUTE: &[&str] = &["/calc", "计算", "calc"];

/// A parsed ledger command
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    /// Record a deposit; `currency` overrides the user's preference
    Deposit { amount: f64, currency: Option<String> },
    /// Record a withdrawal; `currency` overrides the user's preference
    Withdrawal { amount: f64, currency: Option<String> },
    View,
    Summary,
    Delete { timestamp: String },
    SetRate(f64),
    SetCurrency(String),
    SetTimezone(UserTimezone),
    Clear,
    Compute(String),
    Help,
}

impl LedgerCommand {
    /// Parse chat text.
    ///
    /// Returns `Ok(None)` for text that is not a ledger command and an
    /// error for a recognized command with a bad argument.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        if strip_keyword(text, HELP).is_some() {
            return Ok(Some(LedgerCommand::Help));
        }

        if let Some(rest) = strip_keyword(text, ADD) {
            let (amount, currency) = parse_amount(rest)?;
            return Ok(Some(LedgerCommand::Deposit { amount, currency }));
        }

        if let Some(rest) = strip_keyword(text, SUBTRACT) {
            let (amount, currency) = parse_amount(rest)?;
            return Ok(Some(LedgerCommand::Withdrawal { amount, currency }));
        }

        if let Some(rest) = strip_keyword(text, VIEW) {
            return Ok(rest.is_empty().then_some(LedgerCommand::View));
        }

        if let Some(rest) = strip_keyword(text, SUMMARY) {
            return Ok(rest.is_empty().then_some(LedgerCommand::Summary));
        }

        if let Some(rest) = strip_keyword(text, DELETE) {
            if rest.is_empty() {
                return Err(LedgerError::MissingArgument("timestamp"));
            }
            return Ok(Some(LedgerCommand::Delete {
                timestamp: rest.to_string(),
            }));
        }

        if let Some(rest) = strip_keyword(text, RATE) {
            return parse_rate(rest).map(|rate| Some(LedgerCommand::SetRate(rate)));
        }

        if let Some(rest) = strip_keyword(text, CURRENCY_KEYWORDS) {
            if !CURRENCY.is_match(rest) {
                return Err(LedgerError::InvalidCurrency(rest.to_string()));
            }
            return Ok(Some(LedgerCommand::SetCurrency(rest.to_uppercase())));
        }

        if let Some(rest) = strip_keyword(text, TIMEZONE) {
            return parse_timezone(rest).map(|timezone| Some(LedgerCommand::SetTimezone(timezone)));
        }

        if let Some(rest) = strip_keyword(text, CLEAR) {
            return Ok(rest.is_empty().then_some(LedgerCommand::Clear));
        }

        if let Some(rest) = strip_keyword(text, COMPUTE) {
            if rest.is_empty() {
                return Err(LedgerError::MissingArgument("expression"));
            }
            return Ok(Some(LedgerCommand::Compute(rest.to_string())));
        }

        if let Some(caps) = SIGNED_AMOUNT.captures(text) {
            let amount = validate_amount(&caps[2])?;
            let currency = caps.get(3).map(|_| USDT.to_string());
            return Ok(Some(if &caps[1] == "+" {
                LedgerCommand::Deposit { amount, currency }
            } else {
                LedgerCommand::Withdrawal { amount, currency }
            }));
        }

        if looks_like_arithmetic(text) {
            return Ok(Some(LedgerCommand::Compute(text.to_string())));
        }

        // "+abc" is a deposit attempt with a bad amount
        if text.starts_with('+') || text.starts_with('-') {
            return Err(LedgerError::InvalidAmount(text.to_string()));
        }

        Ok(None)
    }
}

/// Match one of `keywords` at the start of `text`, returning the trimmed
/// remainder. ASCII keywords are case-insensitive and must be followed by
/// whitespace or the end of the text; CJK keywords may be followed
/// directly by their argument. A bot mention after a slash command
/// (`/add@my_bot 100`) is skipped.
fn strip_keyword<'a>(text: &'a str, keywords: &[&str]) -> Option<&'a str> {
    for keyword in keywords {
        let rest = if keyword.is_ascii() {
            match text.get(..keyword.len()) {
                Some(head) if head.eq_ignore_ascii_case(keyword) => &text[keyword.len()..],
                _ => continue,
            }
        } else {
            match text.strip_prefix(keyword) {
                Some(rest) => rest,
                None => continue,
            }
        };

        let rest = if keyword.starts_with('/') && rest.starts_with('@') {
            rest.find(char::is_whitespace).map_or("", |i| &rest[i..])
        } else {
            rest
        };

        let at_boundary =
            rest.is_empty() || rest.starts_with(char::is_whitespace) || !keyword.is_ascii();
        if at_boundary {
            return Some(rest.trim());
        }
    }
    None
}

fn validate_amount(value: &str) -> Result<f64> {
    match value.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(LedgerError::InvalidAmount(value.to_string())),
    }
}

fn parse_amount(value: &str) -> Result<(f64, Option<String>)> {
    let caps = AMOUNT
        .captures(value)
        .ok_or_else(|| LedgerError::InvalidAmount(value.to_string()))?;
    let amount = validate_amount(&caps[1])?;
    Ok((amount, caps.get(2).map(|_| USDT.to_string())))
}

fn parse_rate(value: &str) -> Result<f64> {
    match value.parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
        _ => Err(LedgerError::InvalidRate(value.to_string())),
    }
}
