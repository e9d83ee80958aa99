//! SMTP delivery through `lettre`.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::error::NotifyError;
use crate::notifier::{Email, Notifier};

/// Connection settings for an SMTP relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Upgrade the connection with STARTTLS. Disable only for local relays.
    pub starttls: bool,
}

/// Notifier that delivers emails to an SMTP relay.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    /// Builds the transport. No connection is opened until the first send.
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let builder = if settings.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                .map_err(|e| NotifyError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(settings.host.as_str())
        };

        let mut builder = builder.port(settings.port);
        if let Some(user) = &settings.user {
            builder = builder.credentials(Credentials::new(
                user.clone(),
                settings.password.clone().unwrap_or_default(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotifyError::InvalidAddress(format!("{address}: {e}")))
}

/// Converts an [`Email`] into a plain-text MIME message.
pub(crate) fn to_message(email: &Email) -> Result<Message, NotifyError> {
    if email.recipients.is_empty() {
        return Err(NotifyError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(mailbox(&email.sender)?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN);
    for recipient in &email.recipients {
        builder = builder.to(mailbox(recipient)?);
    }

    builder
        .body(email.message.clone())
        .map_err(|e| NotifyError::Delivery(e.to_string()))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, email: Email) -> Result<(), NotifyError> {
        let message = to_message(&email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        tracing::debug!(
            recipients = ?email.recipients,
            subject = %email.subject,
            "email delivered over SMTP"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{InvestorId, LoanId};
    use loan_store::Investor;

    use super::*;

    fn email() -> Email {
        Email::loan_invested(
            "loans@example.com",
            &Investor::new(InvestorId::new(2), "Ana", "ana@example.com"),
            LoanId::new(42),
            "https://docs/agreement.pdf",
        )
    }

    fn local_settings() -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port: 2525,
            user: Some("mailer".to_string()),
            password: Some("secret".to_string()),
            starttls: false,
        }
    }

    #[test]
    fn message_carries_headers_and_body() {
        let message = to_message(&email()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("From: loans@example.com"));
        assert!(raw.contains("To: ana@example.com"));
        assert!(raw.contains("Subject: Loan 42 is invested"));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("https://docs/agreement.pdf"));
    }

    #[test]
    fn message_without_recipients_is_refused() {
        let mut email = email();
        email.recipients.clear();

        assert!(matches!(to_message(&email), Err(NotifyError::NoRecipients)));
    }

    #[test]
    fn malformed_address_is_refused() {
        let mut email = email();
        email.recipients = vec!["not an address".to_string()];

        assert!(matches!(
            to_message(&email),
            Err(NotifyError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn plain_relay_builds_without_connecting() {
        assert!(SmtpNotifier::new(&local_settings()).is_ok());
    }

    #[tokio::test]
    async fn unreachable_relay_reports_delivery_failure() {
        let notifier = SmtpNotifier::new(&SmtpSettings {
            port: 1,
            ..local_settings()
        })
        .unwrap();

        assert!(matches!(
            notifier.send(email()).await,
            Err(NotifyError::Delivery(_))
        ));
    }
}
