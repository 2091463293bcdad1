//! Versioned SQLite schema for the kassenbuch database.
//!
//! Each version knows how to create itself from scratch and how to migrate
//! from the previous one. The current version is tracked via
//! `PRAGMA user_version`.

use anyhow::{bail, Result};
use rusqlite::Connection;

pub struct VersionedSchema {
    pub version: i64,
    /// Statements that create this version from an empty database.
    pub create_sql: &'static [&'static str],
    /// Tables with their expected column counts, used to sanity-check an
    /// existing database before migrating.
    pub tables: &'static [(&'static str, usize)],
    /// Migration from the previous version.
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

const CREATE_V1: &[&str] = &[
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );",
    "CREATE TABLE user_settings (
        user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        notification_enabled INTEGER NOT NULL DEFAULT 0,
        notification_day INTEGER NOT NULL DEFAULT 1,
        notification_hour INTEGER NOT NULL DEFAULT 9,
        notification_minute INTEGER NOT NULL DEFAULT 0,
        smtp_host TEXT,
        smtp_port INTEGER NOT NULL DEFAULT 587,
        smtp_secure INTEGER NOT NULL DEFAULT 0,
        smtp_user TEXT,
        smtp_password TEXT
    );",
    "CREATE TABLE transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        tx_date TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT NOT NULL,
        amount_cents INTEGER NOT NULL,
        kind TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );",
    "CREATE INDEX idx_transactions_user_date ON transactions(user_id, tx_date);",
];

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    create_sql: CREATE_V1,
    tables: &[("users", 4), ("user_settings", 10), ("transactions", 8)],
    migration: None,
}];

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for sql in self.create_sql {
            conn.execute(sql, [])?;
        }
        conn.execute(&format!("PRAGMA user_version = {}", self.version), [])?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for (table, expected_columns) in self.tables {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table))?;
            let actual_columns = stmt.query_map([], |_| Ok(()))?.count();
            if actual_columns != *expected_columns {
                bail!(
                    "Table {} has {} columns, expected {}",
                    table,
                    actual_columns,
                    expected_columns
                );
            }
        }
        Ok(())
    }
}
