//! Domain error types.

use thiserror::Error;

/// Errors raised by the loan domain.
///
/// Illegal lifecycle transitions are not errors; they are reported by the
/// `bool` result of the state machine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoanError {
    /// A persisted or requested state tag is not one of the canonical tags.
    #[error("Unknown loan state: {0:?}")]
    UnknownState(String),

    /// The principal must be a positive amount.
    #[error("Invalid principal: {0} (must be greater than 0)")]
    InvalidPrincipal(i64),

    /// The rate must be a finite, non-negative percentage.
    #[error("Invalid rate: {0} (must be a non-negative percentage)")]
    InvalidRate(f64),

    /// A loan cannot be proposed without a borrower.
    #[error("Borrower ID is required")]
    BorrowerRequired,
}
