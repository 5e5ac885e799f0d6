//! SMTP reply delivery via lettre.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;
use uuid::Uuid;

use crate::config::EmailConfig;
use crate::error::DeliveryError;
use crate::pipeline::ReplySender;
use crate::tasks::ReplyEnvelope;

/// Port for implicit TLS. Any other port uses STARTTLS.
const SMTPS_PORT: u16 = 465;

/// `ReplySender` that sends HTML replies through an SMTP relay.
pub struct SmtpReplySender {
    config: Arc<EmailConfig>,
}

impl SmtpReplySender {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let builder = if self.config.smtp_port == SMTPS_PORT {
            SmtpTransport::relay(&self.config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
        }
        .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        Ok(builder
            .port(self.config.smtp_port)
            .credentials(creds)
            .build())
    }
}

/// Build the outgoing message. Returns it with its `Message-ID`.
pub fn build_message(
    from: &str,
    envelope: &ReplyEnvelope,
) -> Result<(Message, String), DeliveryError> {
    let from: Mailbox = parse_mailbox(from)?;
    let to: Mailbox = parse_mailbox(&envelope.to)?;
    let message_id = format!("<{}@forward-assist>", Uuid::new_v4());

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(envelope.subject.clone())
        .message_id(Some(message_id.clone()))
        .header(ContentType::TEXT_HTML)
        .body(envelope.body_html.clone())
        .map_err(|e| DeliveryError::Build(e.to_string()))?;

    Ok((message, message_id))
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl ReplySender for SmtpReplySender {
    async fn send(&self, envelope: &ReplyEnvelope) -> Result<String, DeliveryError> {
        let (message, message_id) = build_message(&self.config.from_address, envelope)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| DeliveryError::Transport(format!("SMTP task aborted: {e}")))?
            .map_err(|e| DeliveryError::Transport(format!("SMTP send failed: {e}")))?;

        info!(to = %envelope.to, message_id = %message_id, "Reply sent");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{ResponseFormatter, TaskKind};

    fn envelope(to: &str) -> ReplyEnvelope {
        ResponseFormatter::new().format(TaskKind::Summarize, "Short summary", "Budget Q3", to)
    }

    #[test]
    fn builds_html_message() {
        let (message, message_id) =
            build_message("Assistant <assist@company.com>", &envelope("boss@company.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Summary: Budget Q3"));
        assert!(raw.contains("To: boss@company.com"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains(&format!("Message-ID: {message_id}")));
        assert!(message_id.starts_with('<') && message_id.ends_with("@forward-assist>"));
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let err = build_message("assist@company.com", &envelope("not an address")).unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress { ref address, .. } if address == "not an address"));
    }

    #[test]
    fn invalid_sender_is_rejected() {
        assert!(matches!(
            build_message("", &envelope("boss@company.com")),
            Err(DeliveryError::InvalidAddress { .. })
        ));
    }
}
