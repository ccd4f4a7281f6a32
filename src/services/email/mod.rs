use anyhow::Result;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod providers;
pub mod templates;

pub use providers::{LogNotifier, SmtpNotifier, SmtpSettings};
pub use templates::TemplateRenderer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttachment {
    /// Doubles as the inline content id, so `cid:<filename>` works in the body.
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<NotificationAttachment>,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<String>; // Returns message ID
    fn provider_name(&self) -> &'static str;
}

/// Sends in the background. Delivery failures are logged and never reach the
/// caller, whose booking has already been committed.
pub fn dispatch(notifier: Arc<dyn Notifier>, notification: Notification) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let to = notification.to.clone();
        let subject = notification.subject.clone();

        match notifier.send(notification).await {
            Ok(message_id) => {
                info!("📧 '{}' sent to {} via {}: {}", subject, to, notifier.provider_name(), message_id);
            }
            Err(e) => {
                error!("Failed to send '{}' to {} via {}: {}", subject, to, notifier.provider_name(), e);
            }
        }
    })
}
