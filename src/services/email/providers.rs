use super::{Notification, Notifier};
use anyhow::{anyhow, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;

#[derive(Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

/// SMTP relay delivery. The lettre transport is blocking, so each send runs
/// on the blocking pool.
#[derive(Debug, Clone)]
pub struct SmtpNotifier {
    settings: SmtpSettings,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn build_message(&self, notification: &Notification) -> Result<Message> {
        let mut body = MultiPart::related().singlepart(SinglePart::html(notification.html_body.clone()));

        for attachment in &notification.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| anyhow!("Invalid attachment content type: {}", e))?;
            body = body.singlepart(
                Attachment::new_inline(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }

        let message = Message::builder()
            .from(self.settings.from.parse()?)
            .to(notification.to.parse()?)
            .subject(notification.subject.clone())
            .multipart(body)?;

        Ok(message)
    }
}

#[async_trait::async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: Notification) -> Result<String> {
        let message = self.build_message(&notification)?;
        let message_id = message
            .headers()
            .get_raw("Message-ID")
            .unwrap_or("unknown")
            .to_string();

        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let creds = Credentials::new(settings.username, settings.password);
            let mailer = SmtpTransport::relay(&settings.server)?
                .credentials(creds)
                .build();

            mailer.send(&message)?;
            Ok(())
        })
        .await??;

        Ok(message_id)
    }

    fn provider_name(&self) -> &'static str {
        "SMTP"
    }
}

/// Development notifier: nothing leaves the process.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<String> {
        info!(
            "Would send email '{}' to {} ({} bytes of HTML, {} attachment(s))",
            notification.subject,
            notification.to,
            notification.html_body.len(),
            notification.attachments.len()
        );
        Ok(format!("log-{}", uuid::Uuid::new_v4()))
    }

    fn provider_name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::NotificationAttachment;

    fn smtp() -> SmtpNotifier {
        SmtpNotifier::new(SmtpSettings {
            server: "smtp.example.com".to_string(),
            username: "user".to_string(),
            password: "secret".to_string(),
            from: "tickets@example.com".to_string(),
        })
    }

    #[test]
    fn test_message_carries_inline_attachments() {
        let notification = Notification {
            to: "rider@example.com".to_string(),
            subject: "Your Bus Ticket(s)".to_string(),
            html_body: r#"<img src="cid:qr1.png">"#.to_string(),
            attachments: vec![NotificationAttachment {
                filename: "qr1.png".to_string(),
                content_type: "image/png".to_string(),
                content: vec![0x89, b'P', b'N', b'G'],
            }],
        };

        let formatted = String::from_utf8(smtp().build_message(&notification).unwrap().formatted()).unwrap();
        assert!(formatted.contains("multipart/related"));
        assert!(formatted.contains("<qr1.png>"));
        assert!(formatted.contains("Subject: Your Bus Ticket(s)"));
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let notification = Notification {
            to: "not an address".to_string(),
            subject: "x".to_string(),
            html_body: String::new(),
            attachments: vec![],
        };

        assert!(smtp().build_message(&notification).is_err());
    }

    #[tokio::test]
    async fn test_log_notifier_returns_message_id() {
        let id = LogNotifier
            .send(Notification {
                to: "rider@example.com".to_string(),
                subject: "x".to_string(),
                html_body: String::new(),
                attachments: vec![],
            })
            .await
            .unwrap();
        assert!(id.starts_with("log-"));
    }
}
