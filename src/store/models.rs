//! Data models for the kassenbuch database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A provisioned user, created on first authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
}

/// SMTP transport credentials, complete and ready to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub username: String,
    pub password: String,
}

/// Who a reminder goes to. Sourced from the user record, not the settings row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

/// Per-user notification and SMTP settings as stored, one row per user.
///
/// The SMTP fields are optional because the row exists as soon as the user
/// saves anything; a row with `notification_enabled` but missing credentials
/// is stored as-is and simply never scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub notification_enabled: bool,
    pub notification_day: u8,
    pub notification_hour: u8,
    pub notification_minute: u8,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_secure: bool,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            notification_enabled: false,
            notification_day: 1,
            notification_hour: 9,
            notification_minute: 0,
            smtp_host: None,
            smtp_port: 587,
            smtp_secure: false,
            smtp_user: None,
            smtp_password: None,
        }
    }
}

/// A user's notification configuration joined with their recipient identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub user_id: i64,
    pub enabled: bool,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_secure: bool,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub recipient: Recipient,
}

impl NotificationConfig {
    /// The transport credentials, if host, user and password are all present
    /// and non-empty. An enabled configuration without them is not
    /// schedulable.
    pub fn smtp(&self) -> Option<SmtpConfig> {
        let host = self.smtp_host.as_deref().filter(|s| !s.is_empty())?;
        let username = self.smtp_user.as_deref().filter(|s| !s.is_empty())?;
        let password = self.smtp_password.as_deref().filter(|s| !s.is_empty())?;
        Some(SmtpConfig {
            host: host.to_string(),
            port: self.smtp_port,
            secure: self.smtp_secure,
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

/// One ledger entry. Amounts are stored in cents to avoid float rounding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub tx_date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount_cents: i64,
    pub kind: TransactionKind,
}

/// Payload for creating or updating a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub tx_date: NaiveDate,
    pub description: String,
    pub category: String,
    pub amount_cents: i64,
    pub kind: TransactionKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total_cents: i64,
}

/// Einnahmenüberschussrechnung summary for one calendar year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EurReport {
    pub year: i32,
    pub income_cents: i64,
    pub expense_cents: i64,
    pub profit_cents: i64,
    pub income_by_category: Vec<CategoryTotal>,
    pub expense_by_category: Vec<CategoryTotal>,
}
