use super::trigger::WeeklyTrigger;
use crate::mailer::Mailer;
use crate::store::{NotificationConfig, Recipient, SettingsStore, SmtpConfig};
use anyhow::Result;
use chrono::Utc;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a trigger needs to send one reminder, captured at install time.
///
/// Stored alongside the cancellation token so the pending send can be
/// inspected without waiting for a fire. The snapshot stays valid because
/// every settings write replaces the whole entry via `refresh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDescriptor {
    pub user_id: i64,
    pub trigger: WeeklyTrigger,
    pub smtp: SmtpConfig,
    pub recipient: Recipient,
}

struct ActiveReminder {
    descriptor: TriggerDescriptor,
    cancel: CancellationToken,
}

/// Owns the registry of live weekly reminder triggers, at most one per user.
///
/// The registry is in-memory only; a restart rebuilds it from storage via
/// [`initialize`](Self::initialize). All mutations go through the single
/// registry lock, so a cancel/install pair is never interleaved with another
/// operation on the same user.
pub struct ReminderScheduler {
    store: Arc<dyn SettingsStore>,
    mailer: Arc<dyn Mailer>,
    zone: Tz,
    registry: Mutex<HashMap<i64, ActiveReminder>>,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn SettingsStore>, mailer: Arc<dyn Mailer>, zone: Tz) -> Self {
        Self {
            store,
            mailer,
            zone,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Install one trigger per enabled configuration with complete
    /// credentials. Past occurrences are not caught up.
    ///
    /// A storage read failure aborts and leaves whatever was installed so
    /// far; the caller decides whether to treat that as fatal.
    pub async fn initialize(&self) -> Result<()> {
        let configs = self.store.list_enabled_notification_configs()?;
        let mut registry = self.registry.lock().await;
        for config in configs {
            let user_id = config.user_id;
            match descriptor_from_config(config) {
                Some(descriptor) => self.install(&mut registry, descriptor),
                None => warn!("Skipping unschedulable configuration for user {}", user_id),
            }
        }
        info!("Installed {} reminder trigger(s)", registry.len());
        Ok(())
    }

    /// Reconcile one user's trigger with their stored configuration.
    ///
    /// The existing trigger is always cancelled first, so repeated calls with
    /// unchanged storage converge to the same single-or-absent trigger. A
    /// storage error after the cancel leaves the user without a trigger
    /// (fail closed); the error propagates and the next successful refresh
    /// reinstalls it.
    pub async fn refresh(&self, user_id: i64) -> Result<()> {
        let mut registry = self.registry.lock().await;
        if let Some(previous) = registry.remove(&user_id) {
            previous.cancel.cancel();
            debug!("Cancelled previous reminder trigger for user {}", user_id);
        }

        let Some(config) = self.store.get_notification_config(user_id)? else {
            debug!("No stored settings for user {}", user_id);
            return Ok(());
        };

        match descriptor_from_config(config) {
            Some(descriptor) => self.install(&mut registry, descriptor),
            None => info!("Reminders inactive for user {}", user_id),
        }
        Ok(())
    }

    /// Cancel and remove the user's trigger if present. No-op otherwise.
    pub async fn cancel(&self, user_id: i64) {
        if let Some(previous) = self.registry.lock().await.remove(&user_id) {
            previous.cancel.cancel();
            info!("Cancelled reminder trigger for user {}", user_id);
        }
    }

    /// Number of live triggers. Diagnostic only.
    pub async fn active_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// What the user's trigger would send, if one is installed.
    pub async fn descriptor(&self, user_id: i64) -> Option<TriggerDescriptor> {
        self.registry
            .lock()
            .await
            .get(&user_id)
            .map(|active| active.descriptor.clone())
    }

    fn install(&self, registry: &mut HashMap<i64, ActiveReminder>, descriptor: TriggerDescriptor) {
        // At most one live trigger per user: an existing one goes first.
        if let Some(previous) = registry.remove(&descriptor.user_id) {
            previous.cancel.cancel();
        }
        let cancel = CancellationToken::new();
        tokio::spawn(run_trigger(
            descriptor.clone(),
            self.zone,
            Arc::clone(&self.mailer),
            cancel.clone(),
        ));
        info!(
            "Scheduled weekly reminder for user {} ({})",
            descriptor.user_id, descriptor.trigger
        );
        registry.insert(descriptor.user_id, ActiveReminder { descriptor, cancel });
    }
}

/// A configuration is schedulable when it is enabled, its credentials are
/// complete and its stored time passes range validation. Anything else is
/// treated as absent.
fn descriptor_from_config(config: NotificationConfig) -> Option<TriggerDescriptor> {
    if !config.enabled {
        return None;
    }
    let smtp = config.smtp()?;
    let trigger = match WeeklyTrigger::new(config.day, config.hour, config.minute) {
        Ok(trigger) => trigger,
        Err(err) => {
            warn!(
                "Stored notification time for user {} is invalid: {}",
                config.user_id, err
            );
            return None;
        }
    };
    Some(TriggerDescriptor {
        user_id: config.user_id,
        trigger,
        smtp,
        recipient: config.recipient,
    })
}

/// One task per trigger: sleep until the next weekly occurrence in the
/// reference zone, then make a single delivery attempt. Delivery failures are
/// logged and never tear the trigger down; cancellation wakes the sleep
/// immediately but does not abort a send already in progress.
async fn run_trigger(
    descriptor: TriggerDescriptor,
    zone: Tz,
    mailer: Arc<dyn Mailer>,
    cancel: CancellationToken,
) {
    loop {
        let now = Utc::now().with_timezone(&zone);
        let next = descriptor.trigger.next_occurrence(now);
        let wait = (next - now).to_std().unwrap_or_default();
        debug!("Next reminder for user {} at {}", descriptor.user_id, next);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {
                match mailer.send_reminder(&descriptor.recipient, &descriptor.smtp).await {
                    Ok(ack) => info!(
                        "Sent reminder to {} ({})",
                        descriptor.recipient.email, ack
                    ),
                    Err(err) => warn!(
                        "Failed to send reminder to {}: {}",
                        descriptor.recipient.email, err
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::RecordingMailer;
    use crate::store::{SqliteStore, UserSettings, UserStore};
    use chrono_tz::Europe::Berlin;
    use std::time::Duration;
    use tempfile::TempDir;

    fn complete_settings(day: u8, hour: u8, minute: u8) -> UserSettings {
        UserSettings {
            notification_enabled: true,
            notification_day: day,
            notification_hour: hour,
            notification_minute: minute,
            smtp_host: Some("mail.example.com".to_string()),
            smtp_port: 587,
            smtp_secure: false,
            smtp_user: Some("sender@example.com".to_string()),
            smtp_password: Some("secret".to_string()),
        }
    }

    struct Fixture {
        store: Arc<SqliteStore>,
        mailer: Arc<RecordingMailer>,
        scheduler: ReminderScheduler,
        _temp_dir: TempDir,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp_dir.path().join("test.db")).unwrap());
        let mailer = Arc::new(RecordingMailer::default());
        let scheduler =
            ReminderScheduler::new(store.clone(), mailer.clone(), Berlin);
        Fixture {
            store,
            mailer,
            scheduler,
            _temp_dir: temp_dir,
        }
    }

    fn add_user(fixture: &Fixture, email: &str, settings: &UserSettings) -> i64 {
        let user = fixture.store.get_or_create_user(email, "Test").unwrap();
        fixture
            .store
            .upsert_user_settings(user.id, settings)
            .unwrap();
        user.id
    }

    #[tokio::test]
    async fn initialize_installs_only_schedulable_configs() {
        let f = fixture();
        let enabled = add_user(&f, "a@example.com", &complete_settings(1, 9, 0));
        let disabled = add_user(
            &f,
            "b@example.com",
            &UserSettings {
                notification_enabled: false,
                ..complete_settings(1, 9, 0)
            },
        );
        let incomplete = add_user(
            &f,
            "c@example.com",
            &UserSettings {
                smtp_password: None,
                ..complete_settings(1, 9, 0)
            },
        );

        f.scheduler.initialize().await.unwrap();

        assert_eq!(f.scheduler.active_count().await, 1);
        assert!(f.scheduler.descriptor(enabled).await.is_some());
        assert!(f.scheduler.descriptor(disabled).await.is_none());
        assert!(f.scheduler.descriptor(incomplete).await.is_none());
    }

    #[tokio::test]
    async fn initialize_cancel_refresh_scenario() {
        let f = fixture();
        let user_id = add_user(&f, "u1@example.com", &complete_settings(1, 9, 0));

        f.scheduler.initialize().await.unwrap();
        assert_eq!(f.scheduler.active_count().await, 1);

        f.scheduler.cancel(user_id).await;
        assert_eq!(f.scheduler.active_count().await, 0);

        f.scheduler.refresh(user_id).await.unwrap();
        assert_eq!(f.scheduler.active_count().await, 1);
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let f = fixture();
        let user_id = add_user(&f, "a@example.com", &complete_settings(2, 7, 45));

        f.scheduler.refresh(user_id).await.unwrap();
        let first = f.scheduler.descriptor(user_id).await.unwrap();

        f.scheduler.refresh(user_id).await.unwrap();
        let second = f.scheduler.descriptor(user_id).await.unwrap();

        assert_eq!(f.scheduler.active_count().await, 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn refresh_removes_trigger_when_disabled() {
        let f = fixture();
        let user_id = add_user(&f, "a@example.com", &complete_settings(1, 9, 0));
        f.scheduler.refresh(user_id).await.unwrap();
        assert_eq!(f.scheduler.active_count().await, 1);

        f.store
            .upsert_user_settings(
                user_id,
                &UserSettings {
                    notification_enabled: false,
                    ..complete_settings(1, 9, 0)
                },
            )
            .unwrap();
        f.scheduler.refresh(user_id).await.unwrap();
        assert_eq!(f.scheduler.active_count().await, 0);
    }

    #[tokio::test]
    async fn refresh_removes_trigger_when_credentials_deleted() {
        let f = fixture();
        let user_id = add_user(&f, "a@example.com", &complete_settings(1, 9, 0));
        f.scheduler.refresh(user_id).await.unwrap();

        f.store
            .upsert_user_settings(
                user_id,
                &UserSettings {
                    smtp_host: None,
                    ..complete_settings(1, 9, 0)
                },
            )
            .unwrap();
        f.scheduler.refresh(user_id).await.unwrap();
        assert_eq!(f.scheduler.active_count().await, 0);
    }

    #[tokio::test]
    async fn refresh_replaces_trigger_with_new_time() {
        let f = fixture();
        let user_id = add_user(&f, "a@example.com", &complete_settings(1, 8, 0));
        f.scheduler.refresh(user_id).await.unwrap();

        f.store
            .upsert_user_settings(user_id, &complete_settings(3, 9, 30))
            .unwrap();
        f.scheduler.refresh(user_id).await.unwrap();

        assert_eq!(f.scheduler.active_count().await, 1);
        let descriptor = f.scheduler.descriptor(user_id).await.unwrap();
        assert_eq!(descriptor.trigger, WeeklyTrigger::new(3, 9, 30).unwrap());
    }

    #[tokio::test]
    async fn refresh_without_settings_row_is_a_noop() {
        let f = fixture();
        let user = f.store.get_or_create_user("a@example.com", "A").unwrap();

        f.scheduler.refresh(user.id).await.unwrap();
        assert_eq!(f.scheduler.active_count().await, 0);
    }

    /// Delegates to a real store but can be switched to fail config reads,
    /// standing in for a database that goes away mid-flight.
    struct FaultyStore {
        inner: Arc<SqliteStore>,
        fail_reads: std::sync::atomic::AtomicBool,
    }

    impl FaultyStore {
        fn set_fail_reads(&self, fail: bool) {
            self.fail_reads
                .store(fail, std::sync::atomic::Ordering::SeqCst);
        }

        fn reads_fail(&self) -> bool {
            self.fail_reads.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl crate::store::SettingsStore for FaultyStore {
        fn get_user_settings(&self, user_id: i64) -> Result<Option<UserSettings>> {
            self.inner.get_user_settings(user_id)
        }

        fn upsert_user_settings(&self, user_id: i64, settings: &UserSettings) -> Result<()> {
            self.inner.upsert_user_settings(user_id, settings)
        }

        fn get_notification_config(&self, user_id: i64) -> Result<Option<NotificationConfig>> {
            if self.reads_fail() {
                anyhow::bail!("storage offline");
            }
            self.inner.get_notification_config(user_id)
        }

        fn list_enabled_notification_configs(&self) -> Result<Vec<NotificationConfig>> {
            self.inner.list_enabled_notification_configs()
        }
    }

    #[tokio::test]
    async fn refresh_fails_closed_on_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let inner = Arc::new(SqliteStore::new(temp_dir.path().join("test.db")).unwrap());
        let store = Arc::new(FaultyStore {
            inner: inner.clone(),
            fail_reads: std::sync::atomic::AtomicBool::new(false),
        });
        let mailer = Arc::new(RecordingMailer::default());
        let scheduler = ReminderScheduler::new(store.clone(), mailer, Berlin);

        let user = inner.get_or_create_user("a@example.com", "A").unwrap();
        inner
            .upsert_user_settings(user.id, &complete_settings(1, 9, 0))
            .unwrap();
        scheduler.refresh(user.id).await.unwrap();
        assert_eq!(scheduler.active_count().await, 1);

        // The cancel happens before the failing read, so the user ends up
        // without a trigger and the error propagates.
        store.set_fail_reads(true);
        assert!(scheduler.refresh(user.id).await.is_err());
        assert_eq!(scheduler.active_count().await, 0);
        assert!(scheduler.descriptor(user.id).await.is_none());

        // The next successful refresh reinstalls it.
        store.set_fail_reads(false);
        scheduler.refresh(user.id).await.unwrap();
        assert_eq!(scheduler.active_count().await, 1);
    }

    #[tokio::test]
    async fn cancel_unknown_user_is_a_noop() {
        let f = fixture();
        f.scheduler.cancel(12345).await;
        assert_eq!(f.scheduler.active_count().await, 0);
    }

    #[tokio::test]
    async fn descriptor_snapshot_matches_stored_credentials() {
        let f = fixture();
        let user_id = add_user(&f, "a@example.com", &complete_settings(5, 18, 15));
        f.scheduler.refresh(user_id).await.unwrap();

        let descriptor = f.scheduler.descriptor(user_id).await.unwrap();
        assert_eq!(descriptor.recipient.email, "a@example.com");
        assert_eq!(descriptor.smtp.host, "mail.example.com");
        assert_eq!(descriptor.smtp.username, "sender@example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_fires_and_survives_delivery_failure() {
        let f = fixture();
        let user_id = add_user(&f, "a@example.com", &complete_settings(1, 9, 0));
        f.scheduler.refresh(user_id).await.unwrap();
        f.mailer.set_fail_sends(true);

        // With the clock paused, sleeping past the weekly deadline lets the
        // trigger task fire (and fail) at least once.
        tokio::time::sleep(Duration::from_secs(8 * 24 * 3600)).await;

        assert!(f.mailer.sent_count() >= 1);
        assert_eq!(f.scheduler.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_fire_after_cancel() {
        let f = fixture();
        let user_id = add_user(&f, "a@example.com", &complete_settings(1, 9, 0));
        f.scheduler.refresh(user_id).await.unwrap();
        f.scheduler.cancel(user_id).await;

        tokio::time::sleep(Duration::from_secs(30 * 24 * 3600)).await;

        assert_eq!(f.mailer.sent_count(), 0);
    }
}
