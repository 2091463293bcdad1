use super::models::{
    CategoryTotal, EurReport, NewTransaction, NotificationConfig, Recipient, Transaction,
    TransactionKind, User, UserSettings,
};
use super::schema::VERSIONED_SCHEMAS;
use super::{SettingsStore, TransactionStore, UserStore};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const NOTIFICATION_CONFIG_COLUMNS: &str = "s.user_id, s.notification_enabled, \
     s.notification_day, s.notification_hour, s.notification_minute, \
     s.smtp_host, s.smtp_port, s.smtp_secure, s.smtp_user, s.smtp_password, \
     u.email, u.name";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open kassenbuch database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = VERSIONED_SCHEMAS.last().unwrap();
        if is_new_db {
            info!("Creating new kassenbuch database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let db_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let schema = VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version)
                .with_context(|| format!("Unknown database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!("Schema validation failed for database version {}", db_version)
            })?;

            if db_version < latest.version {
                info!(
                    "Migrating database from version {} to {}",
                    db_version, latest.version
                );
                Self::migrate(&mut conn, db_version)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection, from_version: i64) -> Result<()> {
        let tx = conn.transaction()?;
        let mut version = from_version;
        for schema in VERSIONED_SCHEMAS.iter().filter(|s| s.version > from_version) {
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            version = schema.version;
        }
        tx.execute(&format!("PRAGMA user_version = {}", version), [])?;
        tx.commit()?;
        Ok(())
    }

    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date_str: String = row.get("tx_date")?;
        let kind_str: String = row.get("kind")?;
        Ok(Transaction {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            tx_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|_| {
                rusqlite::Error::InvalidColumnType(2, "tx_date".to_string(), rusqlite::types::Type::Text)
            })?,
            description: row.get("description")?,
            category: row.get("category")?,
            amount_cents: row.get("amount_cents")?,
            kind: TransactionKind::parse(&kind_str).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(6, "kind".to_string(), rusqlite::types::Type::Text)
            })?,
        })
    }

    fn row_to_notification_config(row: &rusqlite::Row) -> rusqlite::Result<NotificationConfig> {
        Ok(NotificationConfig {
            user_id: row.get("user_id")?,
            enabled: row.get("notification_enabled")?,
            day: row.get("notification_day")?,
            hour: row.get("notification_hour")?,
            minute: row.get("notification_minute")?,
            smtp_host: row.get("smtp_host")?,
            smtp_port: row.get("smtp_port")?,
            smtp_secure: row.get("smtp_secure")?,
            smtp_user: row.get("smtp_user")?,
            smtp_password: row.get("smtp_password")?,
            recipient: Recipient {
                email: row.get("email")?,
                name: row.get("name")?,
            },
        })
    }

    fn category_totals(
        conn: &Connection,
        user_id: i64,
        year: i32,
        kind: TransactionKind,
    ) -> Result<Vec<CategoryTotal>> {
        let mut stmt = conn.prepare(
            "SELECT category, SUM(amount_cents) AS total_cents FROM transactions
             WHERE user_id = ?1 AND kind = ?2 AND tx_date BETWEEN ?3 AND ?4
             GROUP BY category ORDER BY category",
        )?;
        let totals = stmt
            .query_map(
                params![
                    user_id,
                    kind.as_str(),
                    format!("{:04}-01-01", year),
                    format!("{:04}-12-31", year)
                ],
                |row| {
                    Ok(CategoryTotal {
                        category: row.get(0)?,
                        total_cents: row.get(1)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(totals)
    }
}

impl UserStore for SqliteStore {
    fn get_or_create_user(&self, email: &str, name: &str) -> Result<User> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (email, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(email) DO UPDATE SET name = excluded.name",
            params![email, name, chrono::Utc::now().timestamp()],
        )?;
        let user = conn.query_row(
            "SELECT id, email, name FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )?;
        Ok(user)
    }

    fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, email, name FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}

impl SettingsStore for SqliteStore {
    fn get_user_settings(&self, user_id: i64) -> Result<Option<UserSettings>> {
        let conn = self.conn.lock().unwrap();
        let settings = conn
            .query_row(
                "SELECT notification_enabled, notification_day, notification_hour,
                        notification_minute, smtp_host, smtp_port, smtp_secure,
                        smtp_user, smtp_password
                 FROM user_settings WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserSettings {
                        notification_enabled: row.get(0)?,
                        notification_day: row.get(1)?,
                        notification_hour: row.get(2)?,
                        notification_minute: row.get(3)?,
                        smtp_host: row.get(4)?,
                        smtp_port: row.get(5)?,
                        smtp_secure: row.get(6)?,
                        smtp_user: row.get(7)?,
                        smtp_password: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    fn upsert_user_settings(&self, user_id: i64, settings: &UserSettings) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_settings (user_id, notification_enabled, notification_day,
                 notification_hour, notification_minute, smtp_host, smtp_port,
                 smtp_secure, smtp_user, smtp_password)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_id) DO UPDATE SET
                 notification_enabled = excluded.notification_enabled,
                 notification_day = excluded.notification_day,
                 notification_hour = excluded.notification_hour,
                 notification_minute = excluded.notification_minute,
                 smtp_host = excluded.smtp_host,
                 smtp_port = excluded.smtp_port,
                 smtp_secure = excluded.smtp_secure,
                 smtp_user = excluded.smtp_user,
                 smtp_password = excluded.smtp_password",
            params![
                user_id,
                settings.notification_enabled,
                settings.notification_day,
                settings.notification_hour,
                settings.notification_minute,
                settings.smtp_host,
                settings.smtp_port,
                settings.smtp_secure,
                settings.smtp_user,
                settings.smtp_password,
            ],
        )?;
        Ok(())
    }

    fn get_notification_config(&self, user_id: i64) -> Result<Option<NotificationConfig>> {
        let conn = self.conn.lock().unwrap();
        let config = conn
            .query_row(
                &format!(
                    "SELECT {} FROM user_settings s JOIN users u ON s.user_id = u.id
                     WHERE s.user_id = ?1",
                    NOTIFICATION_CONFIG_COLUMNS
                ),
                params![user_id],
                Self::row_to_notification_config,
            )
            .optional()?;
        Ok(config)
    }

    fn list_enabled_notification_configs(&self) -> Result<Vec<NotificationConfig>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_settings s JOIN users u ON s.user_id = u.id
             WHERE s.notification_enabled = 1
               AND s.smtp_host IS NOT NULL
               AND s.smtp_user IS NOT NULL
               AND s.smtp_password IS NOT NULL",
            NOTIFICATION_CONFIG_COLUMNS
        ))?;
        let configs = stmt
            .query_map([], Self::row_to_notification_config)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(configs)
    }
}

impl TransactionStore for SqliteStore {
    fn add_transaction(&self, user_id: i64, tx: &NewTransaction) -> Result<Transaction> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO transactions (user_id, tx_date, description, category,
                 amount_cents, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                tx.tx_date.to_string(),
                tx.description,
                tx.category,
                tx.amount_cents,
                tx.kind.as_str(),
                chrono::Utc::now().timestamp(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Transaction {
            id,
            user_id,
            tx_date: tx.tx_date,
            description: tx.description.clone(),
            category: tx.category.clone(),
            amount_cents: tx.amount_cents,
            kind: tx.kind,
        })
    }

    fn get_transactions(&self, user_id: i64, year: Option<i32>) -> Result<Vec<Transaction>> {
        let conn = self.conn.lock().unwrap();
        let transactions = match year {
            Some(year) => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, tx_date, description, category, amount_cents, kind
                     FROM transactions
                     WHERE user_id = ?1 AND tx_date BETWEEN ?2 AND ?3
                     ORDER BY tx_date, id",
                )?;
                let rows = stmt.query_map(
                    params![
                        user_id,
                        format!("{:04}-01-01", year),
                        format!("{:04}-12-31", year)
                    ],
                    Self::row_to_transaction,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, tx_date, description, category, amount_cents, kind
                     FROM transactions WHERE user_id = ?1 ORDER BY tx_date, id",
                )?;
                let rows = stmt.query_map(params![user_id], Self::row_to_transaction)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(transactions)
    }

    fn update_transaction(
        &self,
        user_id: i64,
        transaction_id: i64,
        tx: &NewTransaction,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE transactions SET tx_date = ?1, description = ?2, category = ?3,
                 amount_cents = ?4, kind = ?5
             WHERE id = ?6 AND user_id = ?7",
            params![
                tx.tx_date.to_string(),
                tx.description,
                tx.category,
                tx.amount_cents,
                tx.kind.as_str(),
                transaction_id,
                user_id,
            ],
        )?;
        Ok(updated > 0)
    }

    fn delete_transaction(&self, user_id: i64, transaction_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
            params![transaction_id, user_id],
        )?;
        Ok(deleted > 0)
    }

    fn eur_report(&self, user_id: i64, year: i32) -> Result<EurReport> {
        let conn = self.conn.lock().unwrap();
        let income_by_category =
            Self::category_totals(&conn, user_id, year, TransactionKind::Income)?;
        let expense_by_category =
            Self::category_totals(&conn, user_id, year, TransactionKind::Expense)?;
        let income_cents: i64 = income_by_category.iter().map(|c| c.total_cents).sum();
        let expense_cents: i64 = expense_by_category.iter().map(|c| c.total_cents).sum();
        Ok(EurReport {
            year,
            income_cents,
            expense_cents,
            profit_cents: income_cents - expense_cents,
            income_by_category,
            expense_by_category,
        })
    }
}
