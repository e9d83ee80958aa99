use common::LoanId;
use domain::{LoanError, LoanState};
use thiserror::Error;

/// Errors that can occur when interacting with the loan store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The loan no longer matches the state the caller read.
    /// Another writer got there first; nothing was written.
    #[error(
        "Concurrency conflict for loan {loan_id}: expected state {expected} with {invested} invested"
    )]
    Conflict {
        loan_id: LoanId,
        expected: LoanState,
        invested: i64,
    },

    /// The loan was not found in the store.
    #[error("Loan not found: {0}")]
    LoanNotFound(LoanId),

    /// A stored row could not be turned back into a loan.
    #[error("Invalid stored loan: {0}")]
    Domain(#[from] LoanError),

    /// A stored column holds a value outside its known set.
    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for loan store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
