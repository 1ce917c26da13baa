//! Outgoing mail. Delivery is fire-and-forget: callers never wait on it.

use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> anyhow::Result<()> {
        tracing::info!(
            to = %message.to,
            from = %message.from,
            subject = %message.subject,
            "Outgoing mail"
        );
        tracing::debug!("{}", message.html);
        Ok(())
    }
}

/// Send in the background; failures are logged, never surfaced.
pub fn dispatch(mailer: Arc<dyn Mailer>, message: MailMessage) {
    tokio::spawn(async move {
        let to = message.to.clone();
        if let Err(e) = mailer.send(message).await {
            tracing::warn!(to = %to, "Mail delivery failed: {}", e);
        }
    });
}

pub fn password_reset_message(from: &str, to: &str, link: &str) -> MailMessage {
    MailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Password reset".to_string(),
        html: format!(
            "<p>To reset your password follow this link:</p><p><a href=\"{0}\">{0}</a></p>\
             <p>The link expires in one hour and works once.</p>",
            link
        ),
    }
}
