//! Reminder and test mail contents.

use super::MailError;
use crate::store::{Recipient, SmtpConfig};
use lettre::message::{Mailbox, MultiPart};
use lettre::Message;

const SENDER_NAME: &str = "Kassenbuch";

fn mailboxes(recipient: &Recipient, smtp: &SmtpConfig) -> Result<(Mailbox, Mailbox), MailError> {
    let from: Mailbox = format!("{} <{}>", SENDER_NAME, smtp.username).parse()?;
    let to: Mailbox = format!("{} <{}>", recipient.name, recipient.email).parse()?;
    Ok((from, to))
}

pub fn reminder_message(recipient: &Recipient, smtp: &SmtpConfig) -> Result<Message, MailError> {
    let (from, to) = mailboxes(recipient, smtp)?;
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject("Erinnerung: Einnahmen und Ausgaben eintragen")
        .multipart(MultiPart::alternative_plain_html(
            reminder_text(&recipient.name),
            reminder_html(&recipient.name),
        ))?;
    Ok(message)
}

pub fn test_message(recipient: &Recipient, smtp: &SmtpConfig) -> Result<Message, MailError> {
    let (from, to) = mailboxes(recipient, smtp)?;
    let encryption = if smtp.secure { "SSL/TLS" } else { "STARTTLS" };
    let text = format!(
        "Test erfolgreich!\n\n\
         Hallo {},\n\n\
         deine SMTP-Konfiguration funktioniert einwandfrei! Du erhältst \
         zukünftig deine Erinnerungen zum eingetragenen Zeitpunkt.\n\n\
         SMTP-Server: {}:{}\n\
         Verschlüsselung: {}\n\
         Benutzer: {}\n\n\
         Diese Test-E-Mail wurde manuell ausgelöst.",
        recipient.name, smtp.host, smtp.port, encryption, smtp.username
    );
    let html = format!(
        "<h2>Test erfolgreich!</h2>\
         <p>Hallo {},</p>\
         <p>deine SMTP-Konfiguration funktioniert einwandfrei! Du erhältst \
         zukünftig deine Erinnerungen zum eingetragenen Zeitpunkt.</p>\
         <p>SMTP-Server: {}:{}<br>Verschlüsselung: {}<br>Benutzer: {}</p>\
         <p>Diese Test-E-Mail wurde manuell ausgelöst.</p>",
        recipient.name, smtp.host, smtp.port, encryption, smtp.username
    );
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject("Test-E-Mail - Kassenbuch")
        .multipart(MultiPart::alternative_plain_html(text, html))?;
    Ok(message)
}

fn reminder_text(name: &str) -> String {
    format!(
        "Hallo {}!\n\n\
         Dies ist deine wöchentliche Erinnerung, deine Einnahmen und Ausgaben \
         im Kassenbuch einzutragen.\n\n\
         Eine regelmäßige Buchführung hilft dir, den Überblick über deine \
         Finanzen zu behalten und deine Steuererklärung vorzubereiten.\n\n\
         ---\n\
         Diese E-Mail wurde automatisch versendet. Du kannst die \
         Benachrichtigungen in den Einstellungen anpassen oder deaktivieren.",
        name
    )
}

fn reminder_html(name: &str) -> String {
    format!(
        "<h2>Hallo {}!</h2>\
         <p>Dies ist deine wöchentliche Erinnerung, deine <strong>Einnahmen \
         und Ausgaben</strong> im Kassenbuch einzutragen.</p>\
         <p>Eine regelmäßige Buchführung hilft dir, den Überblick über deine \
         Finanzen zu behalten und deine Steuererklärung vorzubereiten.</p>\
         <p style=\"color: #9ca3af; font-size: 14px;\">Diese E-Mail wurde \
         automatisch versendet. Du kannst die Benachrichtigungen in den \
         Einstellungen anpassen oder deaktivieren.</p>",
        name
    )
}
