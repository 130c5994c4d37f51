//! Ledger command execution

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use duobot_core::{Clock, LedgerConfig};

use crate::calc::{self, format_number};
use crate::command::LedgerCommand;
use crate::preferences::PreferenceStore;
use crate::store::LedgerStore;
use crate::types::{LedgerRecord, RecordKind};
use crate::{LedgerError, Result};

/// Format of record timestamps, in the user's timezone
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const HELP_TEXT: &str = "欢迎使用记账机器人！您可以使用以下指令：\n\
+<金额> 记录入款（+100u 记为 USDT）\n\
-<金额> 或 下拨<金额> 记录出款\n\
账单 查看当前账单\n\
汇总 查看入款、出款与净额\n\
删除 <时间> 删除指定时间的记录\n\
汇率 <汇率> 设置汇率\n\
币种 <币种> 设置币种\n\
时区 <时区> 设置时区，例如 Asia/Shanghai 或 +08:00\n\
清除 清除当前账单记录\n\
计算 <表达式> 或直接输入表达式 计算数学表达式";

const NO_RECORDS: &str = "暂无账单记录。";

/// Bookkeeping service behind the ledger bot
pub struct Ledger {
    store: LedgerStore,
    preferences: PreferenceStore,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(store: LedgerStore, preferences: PreferenceStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            preferences,
            clock,
        }
    }

    /// Open the configured database with the configured defaults
    pub fn from_config(config: &LedgerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = LedgerStore::open(&config.db_path)?;
        Ok(Self::new(store, PreferenceStore::from_config(config), clock))
    }

    /// Parse and run chat text. `None` means the text is not a ledger
    /// command; errors become user-facing replies.
    pub fn handle_text(&self, user_id: i64, chat_id: i64, text: &str) -> Option<String> {
        let command = match LedgerCommand::parse(text) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => {
                debug!(user_id, chat_id, "Rejected ledger command: {}", e);
                return Some(e.user_message());
            }
        };

        match self.execute(user_id, chat_id, command) {
            Ok(reply) => Some(reply),
            Err(e) => {
                match &e {
                    LedgerError::Database(_) | LedgerError::Io(_) | LedgerError::Lock => {
                        warn!(user_id, chat_id, "Ledger command failed: {}", e)
                    }
                    _ => debug!(user_id, chat_id, "Ledger command rejected: {}", e),
                }
                Some(e.user_message())
            }
        }
    }

    /// Run a command for `user_id` in `chat_id`, returning the reply text
    pub fn execute(&self, user_id: i64, chat_id: i64, command: LedgerCommand) -> Result<String> {
        match command {
            LedgerCommand::Deposit { amount, currency } => {
                self.record(user_id, chat_id, RecordKind::Deposit, amount, currency)
            }
            LedgerCommand::Withdrawal { amount, currency } => {
                self.record(user_id, chat_id, RecordKind::Withdrawal, amount, currency)
            }
            LedgerCommand::View => self.view(user_id, chat_id),
            LedgerCommand::Summary => self.summary(user_id, chat_id),
            LedgerCommand::Delete { timestamp } => {
                if self.store.delete(user_id, chat_id, &timestamp)? {
                    info!(user_id, chat_id, "Deleted ledger record {}", timestamp);
                    Ok(format!("已删除记录：{}", timestamp))
                } else {
                    Ok(format!("未找到记录：{}", timestamp))
                }
            }
            LedgerCommand::SetRate(rate) => {
                self.preferences.set_exchange_rate(user_id, rate)?;
                Ok(format!("已设置汇率：{}", format_number(rate)))
            }
            LedgerCommand::SetCurrency(currency) => {
                let reply = format!("已设置币种：{}", currency);
                self.preferences.set_currency(user_id, currency);
                Ok(reply)
            }
            LedgerCommand::SetTimezone(timezone) => {
                self.preferences.set_timezone(user_id, timezone);
                Ok(format!("已设置时区：{}", timezone))
            }
            LedgerCommand::Clear => {
                let removed = self.store.clear(user_id, chat_id)?;
                info!(user_id, chat_id, removed, "Cleared ledger records");
                Ok(format!("已清除账单记录（{} 条）", removed))
            }
            LedgerCommand::Compute(expression) => {
                let value = calc::evaluate(&expression)?;
                Ok(format!("计算结果：{}", format_number(value)))
            }
            LedgerCommand::Help => Ok(HELP_TEXT.to_string()),
        }
    }

    fn record(
        &self,
        user_id: i64,
        chat_id: i64,
        kind: RecordKind,
        amount: f64,
        currency: Option<String>,
    ) -> Result<String> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(LedgerError::InvalidAmount(amount.to_string()));
        }

        let timezone = self.preferences.timezone(user_id);
        let record = LedgerRecord {
            user_id,
            chat_id,
            kind,
            amount,
            currency: currency.unwrap_or_else(|| self.preferences.currency(user_id)),
            exchange_rate: self.preferences.exchange_rate(user_id),
            timestamp: timezone.format(self.clock.now(), TIMESTAMP_FORMAT),
        };
        self.store.insert(&record)?;

        Ok(format!(
            "记录{}：{} {} (汇率：{})",
            kind.label(),
            format_number(record.amount),
            record.currency,
            format_number(record.exchange_rate)
        ))
    }

    fn view(&self, user_id: i64, chat_id: i64) -> Result<String> {
        let records = self.store.find(user_id, chat_id)?;
        if records.is_empty() {
            return Ok(NO_RECORDS.to_string());
        }

        let mut reply = String::from("账单：");
        for record in &records {
            reply.push_str(&format!(
                "\n{} {}{} {} (汇率：{})",
                record.timestamp,
                record.kind,
                format_number(record.amount),
                record.currency,
                format_number(record.exchange_rate)
            ));
        }
        Ok(reply)
    }

    fn summary(&self, user_id: i64, chat_id: i64) -> Result<String> {
        let records = self.store.find(user_id, chat_id)?;
        if records.is_empty() {
            return Ok(NO_RECORDS.to_string());
        }

        // currency -> (deposits, withdrawals)
        let mut totals: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
        for record in &records {
            let entry = totals.entry(record.currency.as_str()).or_default();
            match record.kind {
                RecordKind::Deposit => entry.0 += record.amount,
                RecordKind::Withdrawal => entry.1 += record.amount,
            }
        }

        let mut reply = String::from("汇总：");
        for (currency, (deposits, withdrawals)) in &totals {
            reply.push_str(&format!(
                "\n{}：入款 {}，出款 {}，净额 {}",
                currency,
                format_number(*deposits),
                format_number(*withdrawals),
                format_number(deposits - withdrawals)
            ));
        }

        let converted: f64 = records.iter().map(LedgerRecord::converted).sum();
        reply.push_str(&format!("\n按汇率折算净额：{}", format_number(converted)));
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use duobot_core::ManualClock;
    use std::time::Duration;

    fn ledger() -> (Ledger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        ));
        let ledger = Ledger::new(
            LedgerStore::in_memory().unwrap(),
            PreferenceStore::new("CNY", 1.0),
            clock.clone(),
        );
        (ledger, clock)
    }

    fn say(ledger: &Ledger, text: &str) -> String {
        ledger.handle_text(1, 100, text).unwrap()
    }

    #[test]
    fn test_deposit_and_view() {
        let (ledger, clock) = ledger();

        assert_eq!(say(&ledger, "+100"), "记录入款：100 CNY (汇率：1)");
        clock.advance(Duration::from_secs(60));
        assert_eq!(say(&ledger, "下拨30.5"), "记录出款：30.5 CNY (汇率：1)");

        assert_eq!(
            say(&ledger, "账单"),
            "账单：\n2024-01-01 10:00:00 +100 CNY (汇率：1)\n2024-01-01 10:01:00 -30.5 CNY (汇率：1)"
        );
    }

    #[test]
    fn test_usdt_suffix_and_preferences() {
        let (ledger, _) = ledger();

        assert_eq!(say(&ledger, "汇率 7.2"), "已设置汇率：7.2");
        assert_eq!(say(&ledger, "+10u"), "记录入款：10 USDT (汇率：7.2)");

        assert_eq!(say(&ledger, "币种 hkd"), "已设置币种：HKD");
        assert_eq!(say(&ledger, "+5"), "记录入款：5 HKD (汇率：7.2)");
    }

    #[test]
    fn test_timestamps_follow_user_timezone() {
        let (ledger, _) = ledger();

        assert_eq!(say(&ledger, "时区 +08:00"), "已设置时区：UTC+08:00");
        say(&ledger, "+1");

        let view = say(&ledger, "bill");
        assert!(view.contains("2024-01-01 18:00:00 +1 CNY"), "{}", view);
        assert_eq!(say(&ledger, "删除 2024-01-01 18:00:00"), "已删除记录：2024-01-01 18:00:00");
        assert_eq!(say(&ledger, "账单"), NO_RECORDS);
    }

    #[test]
    fn test_named_timezone_stamps_local_time() {
        let (ledger, _) = ledger();

        assert_eq!(say(&ledger, "时区 Asia/Shanghai"), "已设置时区：Asia/Shanghai");
        say(&ledger, "+100");

        assert_eq!(say(&ledger, "账单"), "账单：\n2024-01-01 18:00:00 +100 CNY (汇率：1)");
    }

    #[test]
    fn test_delete_missing_record() {
        let (ledger, _) = ledger();
        assert_eq!(
            say(&ledger, "delete 2020-01-01 00:00:00"),
            "未找到记录：2020-01-01 00:00:00"
        );
    }

    #[test]
    fn test_summary() {
        let (ledger, _) = ledger();
        assert_eq!(say(&ledger, "汇总"), NO_RECORDS);

        say(&ledger, "+100");
        say(&ledger, "-30");
        say(&ledger, "汇率 7");
        say(&ledger, "+10u");

        assert_eq!(
            say(&ledger, "汇总"),
            "汇总：\nCNY：入款 100，出款 30，净额 70\nUSDT：入款 10，出款 0，净额 10\n按汇率折算净额：140"
        );
    }

    #[test]
    fn test_clear_is_scoped_to_chat() {
        let (ledger, _) = ledger();
        say(&ledger, "+1");
        say(&ledger, "+2");
        ledger.handle_text(1, 200, "+3");

        assert_eq!(say(&ledger, "清除"), "已清除账单记录（2 条）");
        assert_eq!(say(&ledger, "账单"), NO_RECORDS);
        assert!(ledger.handle_text(1, 200, "账单").unwrap().contains("+3 CNY"));
    }

    #[test]
    fn test_compute() {
        let (ledger, _) = ledger();
        assert_eq!(say(&ledger, "计算 5+3*2"), "计算结果：11");
        assert_eq!(say(&ledger, "(100-20)/4"), "计算结果：20");
        assert_eq!(say(&ledger, "1/0"), "计算错误：除数不能为零");
    }

    #[test]
    fn test_errors_become_replies() {
        let (ledger, _) = ledger();
        assert_eq!(say(&ledger, "+abc"), "请提供一个有效的金额。");
        assert_eq!(say(&ledger, "汇率 -1"), "请提供一个有效的汇率。");
        assert_eq!(say(&ledger, "删除"), "请提供一个有效的时间戳。");
        assert!(say(&ledger, "时区 Mars/Base").starts_with("请提供一个有效的时区"));
    }

    #[test]
    fn test_unrelated_text_is_ignored() {
        let (ledger, _) = ledger();
        assert!(ledger.handle_text(1, 100, "good morning").is_none());
    }

    #[test]
    fn test_execute_rejects_non_positive_amount() {
        let (ledger, _) = ledger();
        let result = ledger.execute(
            1,
            100,
            LedgerCommand::Deposit {
                amount: f64::NAN,
                currency: None,
            },
        );
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_help() {
        let (ledger, _) = ledger();
        assert_eq!(say(&ledger, "/help"), HELP_TEXT);
    }

    #[test]
    fn test_from_config_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            db_path: dir.path().join("ledger.db").to_string_lossy().into_owned(),
            default_currency: "EUR".to_string(),
            default_exchange_rate: 1.1,
        };

        let ledger = Ledger::from_config(&config, Arc::new(ManualClock::default())).unwrap();
        assert_eq!(
            ledger.handle_text(1, 1, "+5").unwrap(),
            "记录入款：5 EUR (汇率：1.1)"
        );
    }
}
