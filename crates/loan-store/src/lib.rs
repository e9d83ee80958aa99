//! Loan persistence for the lifecycle service.
//!
//! The [`LoanRepository`] trait is the only way the service touches storage.
//! Every write that records a lifecycle transition is transactional and
//! conditioned on the state the caller read ([`Guard`]); a stale guard fails
//! with [`StoreError::Conflict`] and nothing is written.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryLoanStore;
pub use postgres::PostgresLoanStore;
pub use store::{Guard, Investor, LoanRepository};
