//! Durable storage: users, per-user settings and the transaction ledger.

mod models;
mod schema;
mod sqlite_store;

pub use models::{
    CategoryTotal, EurReport, NewTransaction, NotificationConfig, Recipient, SmtpConfig,
    Transaction, TransactionKind, User, UserSettings,
};
pub use sqlite_store::SqliteStore;

use anyhow::Result;

pub trait UserStore: Send + Sync {
    /// Returns the user with this email, creating them on first sight.
    /// An existing user's display name is refreshed from the given value.
    fn get_or_create_user(&self, email: &str, name: &str) -> Result<User>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, user_id: i64) -> Result<Option<User>>;
}

pub trait SettingsStore: Send + Sync {
    /// Returns Ok(None) if the user never saved any settings.
    fn get_user_settings(&self, user_id: i64) -> Result<Option<UserSettings>>;

    /// Inserts or replaces the user's settings row, never duplicating it.
    fn upsert_user_settings(&self, user_id: i64, settings: &UserSettings) -> Result<()>;

    /// One user's notification configuration joined with their recipient
    /// identity. Returns Ok(None) if there is no settings row.
    fn get_notification_config(&self, user_id: i64) -> Result<Option<NotificationConfig>>;

    /// All configurations that are enabled and carry complete transport
    /// credentials, for startup initialization.
    fn list_enabled_notification_configs(&self) -> Result<Vec<NotificationConfig>>;
}

pub trait TransactionStore: Send + Sync {
    fn add_transaction(&self, user_id: i64, tx: &NewTransaction) -> Result<Transaction>;

    /// The user's ledger entries, optionally restricted to one calendar year,
    /// ordered by date.
    fn get_transactions(&self, user_id: i64, year: Option<i32>) -> Result<Vec<Transaction>>;

    /// Returns false if no entry with this id belongs to the user.
    fn update_transaction(
        &self,
        user_id: i64,
        transaction_id: i64,
        tx: &NewTransaction,
    ) -> Result<bool>;

    /// Returns false if no entry with this id belongs to the user.
    fn delete_transaction(&self, user_id: i64, transaction_id: i64) -> Result<bool>;

    fn eur_report(&self, user_id: i64, year: i32) -> Result<EurReport>;
}

pub trait FullStore: UserStore + SettingsStore + TransactionStore {}

impl<T: UserStore + SettingsStore + TransactionStore> FullStore for T {}
