use super::message::{reminder_message, test_message};
use super::{MailError, Mailer};
use crate::store::{Recipient, SmtpConfig};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

/// Stateless SMTP mailer. A transport is built per call from the given
/// credentials, since every user brings their own SMTP server.
pub struct SmtpMailer;

impl SmtpMailer {
    fn transport(smtp: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        // secure = implicit TLS (465-style), otherwise STARTTLS is required.
        let builder = if smtp.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| MailError::Connection(e.to_string()))?;

        Ok(builder
            .port(smtp.port)
            .credentials(Credentials::new(
                smtp.username.clone(),
                smtp.password.clone(),
            ))
            .build())
    }

    async fn send(&self, message: Message, smtp: &SmtpConfig) -> Result<String, MailError> {
        let transport = Self::transport(smtp)?;
        let response = transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        Ok(response.message().collect::<Vec<&str>>().join(" "))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_reminder(
        &self,
        recipient: &Recipient,
        smtp: &SmtpConfig,
    ) -> Result<String, MailError> {
        debug!("Sending reminder mail to {}", recipient.email);
        let message = reminder_message(recipient, smtp)?;
        self.send(message, smtp).await
    }

    async fn send_test(
        &self,
        recipient: &Recipient,
        smtp: &SmtpConfig,
    ) -> Result<String, MailError> {
        debug!("Sending test mail to {}", recipient.email);
        let message = test_message(recipient, smtp)?;
        self.send(message, smtp).await
    }

    async fn test_connection(&self, smtp: &SmtpConfig) -> Result<(), MailError> {
        let transport = Self::transport(smtp)?;
        let ok = transport
            .test_connection()
            .await
            .map_err(|e| MailError::Connection(e.to_string()))?;
        if ok {
            Ok(())
        } else {
            Err(MailError::Connection("server did not accept the connection".to_string()))
        }
    }
}
