//! Loan aggregate and lifecycle types.

mod aggregate;
mod records;
mod state;
mod terms;

pub use aggregate::Loan;
pub use records::{Approval, ApprovalAction, Investment};
pub use state::LoanState;
pub use terms::LoanTerms;
