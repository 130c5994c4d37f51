//! Ledger record types

use std::fmt;

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Deposit,
    Withdrawal,
}

impl RecordKind {
    /// Stored representation, also used as the sign in listings
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Deposit => "+",
            RecordKind::Withdrawal => "-",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "+" => Some(RecordKind::Deposit),
            "-" => Some(RecordKind::Withdrawal),
            _ => None,
        }
    }

    /// Multiplier applied to the amount when totalling
    pub fn sign(&self) -> f64 {
        match self {
            RecordKind::Deposit => 1.0,
            RecordKind::Withdrawal => -1.0,
        }
    }

    /// Label used in replies
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Deposit => "入款",
            RecordKind::Withdrawal => "出款",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single deposit or withdrawal
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub user_id: i64,
    pub chat_id: i64,
    pub kind: RecordKind,
    pub amount: f64,
    pub currency: String,
    pub exchange_rate: f64,
    /// `%Y-%m-%d %H:%M:%S` in the user's timezone; doubles as the delete key
    pub timestamp: String,
}

impl LedgerRecord {
    /// Signed amount converted with the record's exchange rate
    pub fn converted(&self) -> f64 {
        self.kind.sign() * self.amount * self.exchange_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_storage_form() {
        for kind in [RecordKind::Deposit, RecordKind::Withdrawal] {
            assert_eq!(RecordKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RecordKind::parse("?"), None);
    }

    #[test]
    fn test_converted_amount() {
        let record = LedgerRecord {
            user_id: 1,
            chat_id: 2,
            kind: RecordKind::Withdrawal,
            amount: 10.0,
            currency: "USDT".to_string(),
            exchange_rate: 7.0,
            timestamp: "2024-01-01 00:00:00".to_string(),
        };
        assert_eq!(record.converted(), -70.0);
    }
}
