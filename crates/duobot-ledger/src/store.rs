//! Ledger persistence using SQLite

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::types::{LedgerRecord, RecordKind};
use crate::{LedgerError, Result};

/// SQLite-based ledger record store
pub struct LedgerStore {
    conn: Mutex<Connection>,
}

impl LedgerStore {
    /// Open (or create) the database at `db_path`, creating parent
    /// directories as needed
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        info!("Ledger database opened at {}", db_path.display());
        Ok(store)
    }

    /// Create an in-memory ledger store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::Lock)
    }

    /// Initialize database tables
    fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                record_type TEXT NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                exchange_rate REAL NOT NULL,
                timestamp TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_owner ON records(user_id, chat_id)",
            [],
        )?;

        Ok(())
    }

    /// Insert a record, returning its row id
    pub fn insert(&self, record: &LedgerRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO records (user_id, chat_id, record_type, amount, currency, exchange_rate, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.user_id,
                record.chat_id,
                record.kind.as_str(),
                record.amount,
                record.currency,
                record.exchange_rate,
                record.timestamp,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(user_id = record.user_id, chat_id = record.chat_id, id, "Inserted ledger record");
        Ok(id)
    }

    /// All records of a user in a chat, oldest first
    pub fn find(&self, user_id: i64, chat_id: i64) -> Result<Vec<LedgerRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, chat_id, record_type, amount, currency, exchange_rate, timestamp
             FROM records WHERE user_id = ?1 AND chat_id = ?2 ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![user_id, chat_id], |row| {
                let kind: String = row.get(2)?;
                let kind = RecordKind::parse(&kind).ok_or(rusqlite::Error::InvalidQuery)?;

                Ok(LedgerRecord {
                    user_id: row.get(0)?,
                    chat_id: row.get(1)?,
                    kind,
                    amount: row.get(3)?,
                    currency: row.get(4)?,
                    exchange_rate: row.get(5)?,
                    timestamp: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Delete the oldest record with this timestamp. Returns whether a
    /// record was removed.
    pub fn delete(&self, user_id: i64, chat_id: i64, timestamp: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM records WHERE id = (
                SELECT id FROM records
                WHERE user_id = ?1 AND chat_id = ?2 AND timestamp = ?3
                ORDER BY id LIMIT 1
            )",
            params![user_id, chat_id, timestamp],
        )?;
        Ok(removed > 0)
    }

    /// Delete every record of a user in a chat, returning how many
    pub fn clear(&self, user_id: i64, chat_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM records WHERE user_id = ?1 AND chat_id = ?2",
            params![user_id, chat_id],
        )?;
        Ok(removed)
    }
}
