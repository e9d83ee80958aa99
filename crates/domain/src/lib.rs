//! Domain layer for the loan lifecycle service.
//!
//! This crate provides:
//! - The `Loan` aggregate with its funding invariant
//! - `Investment` and `Approval` records
//! - The `LoanState` lifecycle state machine (proposed, approved, invested, disbursed)

pub mod error;
pub mod loan;

pub use error::LoanError;
pub use loan::{Approval, ApprovalAction, Investment, Loan, LoanState, LoanTerms};
