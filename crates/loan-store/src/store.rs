use async_trait::async_trait;
use common::{BorrowerId, InvestorId, LoanId};
use domain::{Approval, Investment, Loan, LoanState};

use crate::{Result, StoreError};

/// The persisted condition a write expects to find.
///
/// Captured from a loan before a lifecycle operation mutates it, then
/// checked by the store inside the write transaction. State changes are
/// conditioned on `state`; investment writes also on `invested`, so two
/// concurrent partial investments cannot push the total past the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    /// Loan being written.
    pub loan_id: LoanId,

    /// State the caller read.
    pub state: LoanState,

    /// Invested total the caller read.
    pub invested: i64,
}

impl Guard {
    /// Creates a guard from explicit values.
    pub fn new(loan_id: LoanId, state: LoanState, invested: i64) -> Self {
        Self {
            loan_id,
            state,
            invested,
        }
    }

    /// Captures the guard for a loan as it was loaded.
    pub fn of(loan_id: LoanId, loan: &Loan) -> Self {
        Self::new(loan_id, loan.state(), loan.sum_investment())
    }

    /// The error returned when this guard no longer holds.
    pub fn conflict(&self) -> StoreError {
        StoreError::Conflict {
            loan_id: self.loan_id,
            expected: self.state,
            invested: self.invested,
        }
    }
}

/// Contact details of an investor, used to notify them when a loan is funded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Investor {
    pub id: InvestorId,
    pub name: String,
    pub email: String,
}

impl Investor {
    /// Creates an investor contact.
    pub fn new(id: InvestorId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Core trait for loan store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Writes that
/// combine a record with a state change are atomic: both apply or neither.
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// Inserts a new loan and returns its generated ID.
    async fn insert_loan(&self, loan: &Loan) -> Result<LoanId>;

    /// Retrieves a loan with its investments and approvals.
    ///
    /// Returns None if the loan doesn't exist.
    async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>>;

    /// Moves a loan to `next` if it is still in `guard.state`.
    async fn update_state(&self, guard: Guard, next: LoanState) -> Result<()>;

    /// Records an investment that does not change the loan's state.
    async fn insert_investment(&self, investment: &Investment, guard: Guard) -> Result<()>;

    /// Records an investment and moves the loan to `next` in one transaction.
    async fn insert_investment_and_update_state(
        &self,
        investment: &Investment,
        guard: Guard,
        next: LoanState,
    ) -> Result<()>;

    /// Records an approval or disbursement and moves the loan to `next` in
    /// one transaction.
    async fn insert_approval_and_update_state(
        &self,
        approval: &Approval,
        guard: Guard,
        next: LoanState,
    ) -> Result<()>;

    /// Retrieves loans currently in a state.
    async fn loans_by_state(&self, state: LoanState) -> Result<Vec<Loan>>;

    /// Retrieves loans requested by a borrower.
    async fn loans_by_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Loan>>;

    /// Retrieves loans an investor has invested in.
    async fn loans_by_investor(&self, investor_id: InvestorId) -> Result<Vec<Loan>>;

    /// Retrieves the distinct investors of a loan.
    ///
    /// Investors without stored contact details are skipped.
    async fn investors_by_loan(&self, loan_id: LoanId) -> Result<Vec<Investor>>;
}
