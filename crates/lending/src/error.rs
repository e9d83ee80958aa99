//! Lending error types.

use common::LoanId;
use domain::LoanError;
use loan_store::StoreError;
use thiserror::Error;

/// Errors returned by [`crate::LoanService`] operations.
///
/// An operation that is not legal in the loan's current state is not an
/// error; it returns `Ok(None)`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No loan exists with the given ID.
    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    /// The proposed terms were rejected.
    #[error("Invalid loan terms: {0}")]
    InvalidTerms(#[from] LoanError),

    /// Loan store error, including conflicts that outlasted the retries.
    #[error("Loan store error: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Returns true if a concurrent writer won the race for the loan.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::Store(StoreError::Conflict { .. }))
    }
}

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The email has no recipients.
    #[error("Email has no recipients")]
    NoRecipients,

    /// A sender or recipient is not a valid mailbox.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The SMTP transport could not be configured.
    #[error("Transport setup failed: {0}")]
    Transport(String),

    /// The transport refused or failed to deliver the email.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
