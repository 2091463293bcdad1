//! Email delivery over SMTP.

mod message;
mod smtp;

pub use smtp::SmtpMailer;

use crate::store::{Recipient, SmtpConfig};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("smtp connection failed: {0}")]
    Connection(String),
}

/// Port for sending the bookkeeping reminder mails. Every call is a single
/// best-effort delivery attempt; there is no queueing and no retry.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver the weekly reminder. Returns the transport acknowledgment.
    async fn send_reminder(
        &self,
        recipient: &Recipient,
        smtp: &SmtpConfig,
    ) -> Result<String, MailError>;

    /// Deliver a manually triggered test message.
    async fn send_test(
        &self,
        recipient: &Recipient,
        smtp: &SmtpConfig,
    ) -> Result<String, MailError>;

    /// Verify the credentials can connect and authenticate, without sending.
    async fn test_connection(&self, smtp: &SmtpConfig) -> Result<(), MailError>;
}

#[cfg(test)]
pub use test_support::RecordingMailer;
