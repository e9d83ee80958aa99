//! Loan lifecycle orchestration.
//!
//! [`LoanService`] loads a loan, applies one lifecycle operation to it and
//! persists the outcome through a [`loan_store::LoanRepository`]. When an
//! investment fills a loan, investors are notified in the background by the
//! [`NotificationDispatcher`]; delivery never affects the operation result.

pub mod dispatch;
pub mod error;
pub mod notifier;
pub mod service;
pub mod smtp;

pub use dispatch::{NotificationDispatcher, NotificationJob};
pub use error::{NotifyError, Result, ServiceError};
pub use notifier::{Email, InMemoryNotifier, Notifier, TracingNotifier};
pub use service::{LoanService, ServiceConfig};
pub use smtp::{SmtpNotifier, SmtpSettings};
