use axum::extract::FromRef;

use crate::mailer::Mailer;
use crate::scheduler::ReminderScheduler;
use crate::store::FullStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedStore = Arc<dyn FullStore>;
pub type GuardedScheduler = Arc<ReminderScheduler>;
pub type GuardedMailer = Arc<dyn Mailer>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub store: GuardedStore,
    pub scheduler: GuardedScheduler,
    pub mailer: GuardedMailer,
}

impl FromRef<ServerState> for GuardedStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedScheduler {
    fn from_ref(input: &ServerState) -> Self {
        input.scheduler.clone()
    }
}

impl FromRef<ServerState> for GuardedMailer {
    fn from_ref(input: &ServerState) -> Self {
        input.mailer.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
