//! Email notifier trait and implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::LoanId;
use loan_store::Investor;

use crate::error::NotifyError;

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub message: String,
}

impl Email {
    /// Builds the email telling an investor that a loan is fully funded.
    pub fn loan_invested(
        sender: &str,
        investor: &Investor,
        loan_id: LoanId,
        agreement_letter_url: &str,
    ) -> Self {
        Self {
            sender: sender.to_string(),
            recipients: vec![investor.email.clone()],
            subject: format!("Loan {loan_id} is invested"),
            message: format!(
                "Dear {},\nPlease find the link to the agreement letter: {}\nThanks",
                investor.name, agreement_letter_url
            ),
        }
    }
}

/// Trait for email delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends an email.
    async fn send(&self, email: Email) -> Result<(), NotifyError>;
}

/// Notifier that writes each email to the log instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, email: Email) -> Result<(), NotifyError> {
        if email.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        tracing::info!(
            sender = %email.sender,
            recipients = ?email.recipients,
            subject = %email.subject,
            "email sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<Email>,
    fail_on_send: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send call.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the emails delivered so far.
    pub fn sent(&self) -> Vec<Email> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the number of emails delivered so far.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, email: Email) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(NotifyError::Delivery("Mailbox unavailable".to_string()));
        }
        if email.recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }

        state.sent.push(email);
        Ok(())
    }
}
