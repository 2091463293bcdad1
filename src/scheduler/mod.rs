//! Per-user weekly reminder scheduling.

mod reminder_scheduler;
mod trigger;

pub use reminder_scheduler::{ReminderScheduler, TriggerDescriptor};
pub use trigger::{TriggerError, WeeklyTrigger};
