//! Borrower-supplied terms for proposing a loan.

use common::BorrowerId;
use serde::{Deserialize, Serialize};

use crate::error::LoanError;

/// Terms a borrower proposes a loan with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Principal in minor currency units.
    pub amount: i64,

    /// Nominal rate as a percentage (e.g. `12.5` for 12.5%).
    pub rate: f64,

    /// Borrower requesting the loan.
    pub borrower_id: BorrowerId,

    /// Agreement letter reference; may be filled in later.
    #[serde(default)]
    pub agreement_letter_url: String,
}

impl LoanTerms {
    /// Creates loan terms.
    pub fn new(
        amount: i64,
        rate: f64,
        borrower_id: BorrowerId,
        agreement_letter_url: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            rate,
            borrower_id,
            agreement_letter_url: agreement_letter_url.into(),
        }
    }

    /// Checks that the terms describe a loan that can be proposed.
    pub fn validate(&self) -> Result<(), LoanError> {
        if self.amount <= 0 {
            return Err(LoanError::InvalidPrincipal(self.amount));
        }

        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(LoanError::InvalidRate(self.rate));
        }

        if self.borrower_id.is_unset() {
            return Err(LoanError::BorrowerRequired);
        }

        Ok(())
    }

    /// Flat return on investment: `rate% * principal`.
    ///
    /// Informational only; funding comparisons use the integer principal.
    pub fn roi(&self) -> f64 {
        (self.rate / 100.0) * self.amount as f64
    }
}
