//! Per-user ledger preferences
//!
//! Currency, exchange rate and timezone are kept in process memory and
//! reset on restart. Unset values fall back to the configured defaults.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use regex::Regex;

use duobot_core::LedgerConfig;

use crate::{LedgerError, Result};

static OFFSET_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:utc|gmt)?([+-])(\d{1,2})(?::?(\d{2}))?$").unwrap());

/// Timezone used to stamp a user's records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserTimezone {
    /// IANA database zone such as `Asia/Shanghai`; follows daylight saving
    Named(Tz),
    /// Fixed offset from UTC
    Fixed(FixedOffset),
}

impl UserTimezone {
    /// Render `now` in this timezone with a strftime pattern
    pub fn format(&self, now: DateTime<Utc>, pattern: &str) -> String {
        match self {
            UserTimezone::Named(tz) => now.with_timezone(tz).format(pattern).to_string(),
            UserTimezone::Fixed(offset) => now.with_timezone(offset).format(pattern).to_string(),
        }
    }
}

impl Default for UserTimezone {
    fn default() -> Self {
        UserTimezone::Fixed(utc_offset())
    }
}

impl fmt::Display for UserTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserTimezone::Named(tz) => f.write_str(tz.name()),
            UserTimezone::Fixed(offset) => write!(f, "UTC{}", offset),
        }
    }
}

/// Settings chosen by one user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPreferences {
    pub currency: Option<String>,
    pub exchange_rate: Option<f64>,
    pub timezone: Option<UserTimezone>,
}

/// Preferences of every user, keyed by Telegram user id
pub struct PreferenceStore {
    entries: DashMap<i64, UserPreferences>,
    default_currency: String,
    default_exchange_rate: f64,
}

impl PreferenceStore {
    pub fn new(default_currency: impl Into<String>, default_exchange_rate: f64) -> Self {
        Self {
            entries: DashMap::new(),
            default_currency: default_currency.into(),
            default_exchange_rate,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.default_currency.clone(), config.default_exchange_rate)
    }

    pub fn get(&self, user_id: i64) -> UserPreferences {
        self.entries
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn currency(&self, user_id: i64) -> String {
        self.get(user_id)
            .currency
            .unwrap_or_else(|| self.default_currency.clone())
    }

    pub fn exchange_rate(&self, user_id: i64) -> f64 {
        self.get(user_id)
            .exchange_rate
            .unwrap_or(self.default_exchange_rate)
    }

    /// The user's timezone, UTC when unset
    pub fn timezone(&self, user_id: i64) -> UserTimezone {
        self.get(user_id).timezone.unwrap_or_default()
    }

    pub fn set_currency(&self, user_id: i64, currency: impl Into<String>) {
        self.entries.entry(user_id).or_default().currency = Some(currency.into());
    }

    pub fn set_exchange_rate(&self, user_id: i64, rate: f64) -> Result<()> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(LedgerError::InvalidRate(rate.to_string()));
        }
        self.entries.entry(user_id).or_default().exchange_rate = Some(rate);
        Ok(())
    }

    pub fn set_timezone(&self, user_id: i64, timezone: UserTimezone) {
        self.entries.entry(user_id).or_default().timezone = Some(timezone);
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse an IANA zone name (`Asia/Shanghai`) or a UTC offset such as
/// `UTC`, `+08:00`, `+0800`, `+8`, `UTC+8` or `GMT-05:30`
pub fn parse_timezone(value: &str) -> Result<UserTimezone> {
    let value = value.trim();
    if ["utc", "gmt", "z"].iter().any(|name| value.eq_ignore_ascii_case(name)) {
        return Ok(UserTimezone::Fixed(utc_offset()));
    }
    if let Some(offset) = parse_offset(value)? {
        return Ok(UserTimezone::Fixed(offset));
    }

    value
        .parse::<Tz>()
        .map(UserTimezone::Named)
        .map_err(|_| LedgerError::InvalidTimezone(value.to_string()))
}

/// `Ok(None)` when the text is not offset-shaped at all
fn parse_offset(value: &str) -> Result<Option<FixedOffset>> {
    let Some(caps) = OFFSET_PATTERN.captures(value) else {
        return Ok(None);
    };
    let invalid = || LedgerError::InvalidTimezone(value.to_string());

    let hours: i32 = caps[2].parse().map_err(|_| invalid())?;
    let minutes: i32 = match caps.get(3) {
        Some(m) => m.as_str().parse().map_err(|_| invalid())?,
        None => 0,
    };
    if hours > 14 || minutes >= 60 {
        return Err(invalid());
    }

    let seconds = (hours * 3600 + minutes * 60) * if &caps[1] == "-" { -1 } else { 1 };
    FixedOffset::east_opt(seconds).map(Some).ok_or_else(invalid)
}
