//! Shared types used across the loan lifecycle crates.

mod types;

pub use types::{BorrowerId, EmployeeId, InvestorId, LoanId};
