//! Loan aggregate implementation.

use common::{BorrowerId, LoanId};
use serde::Serialize;

use super::{Approval, Investment, LoanState, LoanTerms};
use crate::error::LoanError;

/// Loan aggregate root.
///
/// Owns the principal, the investments accumulated toward it, the signed
/// approval and disbursement records, and the current lifecycle state.
/// The sum of investments never exceeds the principal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loan {
    /// Identifier assigned by the store; `None` until persisted.
    id: Option<LoanId>,

    /// Principal in minor currency units.
    amount: i64,

    /// Nominal rate as a percentage.
    rate: f64,

    /// Flat return on investment derived from rate and principal.
    roi: f64,

    /// Borrower who requested the loan.
    borrower_id: BorrowerId,

    /// Agreement letter reference, sent to investors once funded.
    agreement_letter_url: String,

    /// Accepted investments in the order they were made.
    investments: Vec<Investment>,

    /// Approval and disbursement records in the order they were signed.
    approvals: Vec<Approval>,

    /// Current lifecycle state.
    state: LoanState,
}

impl Loan {
    /// Proposes a new loan from borrower terms.
    ///
    /// The loan starts in [`LoanState::Proposed`] with its ROI computed.
    pub fn propose(terms: LoanTerms) -> Result<Self, LoanError> {
        terms.validate()?;
        let roi = terms.roi();

        Ok(Self {
            id: None,
            amount: terms.amount,
            rate: terms.rate,
            roi,
            borrower_id: terms.borrower_id,
            agreement_letter_url: terms.agreement_letter_url,
            investments: Vec::new(),
            approvals: Vec::new(),
            state: LoanState::Proposed,
        })
    }

    /// Rebuilds a loan from persisted parts.
    ///
    /// The store is trusted to hand back data that was written through the
    /// lifecycle operations, so no invariant is re-checked here.
    pub fn restore(
        id: LoanId,
        terms: LoanTerms,
        roi: f64,
        state: LoanState,
        investments: Vec<Investment>,
        approvals: Vec<Approval>,
    ) -> Self {
        Self {
            id: Some(id),
            amount: terms.amount,
            rate: terms.rate,
            roi,
            borrower_id: terms.borrower_id,
            agreement_letter_url: terms.agreement_letter_url,
            investments,
            approvals,
            state,
        }
    }

    /// Records the identifier generated by the store.
    pub fn assign_id(&mut self, id: LoanId) {
        self.id = Some(id);
    }

    pub(crate) fn set_state(&mut self, state: LoanState) {
        self.state = state;
    }
}

// Query methods
impl Loan {
    /// Returns the loan ID, if assigned.
    pub fn id(&self) -> Option<LoanId> {
        self.id
    }

    /// Returns the principal.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the nominal rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Returns the informational ROI.
    pub fn roi(&self) -> f64 {
        self.roi
    }

    /// Returns the borrower ID.
    pub fn borrower_id(&self) -> BorrowerId {
        self.borrower_id
    }

    /// Returns the agreement letter reference.
    pub fn agreement_letter_url(&self) -> &str {
        &self.agreement_letter_url
    }

    /// Returns the investments in the order they were accepted.
    pub fn investments(&self) -> &[Investment] {
        &self.investments
    }

    /// Returns the approval and disbursement records.
    pub fn approvals(&self) -> &[Approval] {
        &self.approvals
    }

    /// Returns the current state.
    pub fn state(&self) -> LoanState {
        self.state
    }

    /// Returns the terms the loan was proposed with.
    pub fn terms(&self) -> LoanTerms {
        LoanTerms::new(
            self.amount,
            self.rate,
            self.borrower_id,
            self.agreement_letter_url.clone(),
        )
    }

    /// Sum of all accepted investment amounts.
    pub fn sum_investment(&self) -> i64 {
        self.investments.iter().map(|i| i.amount).sum()
    }

    /// Amount still needed to reach the principal.
    pub fn remaining(&self) -> i64 {
        self.amount - self.sum_investment()
    }
}

// Mutators
impl Loan {
    /// Adds an investment if it does not push the total past the principal.
    ///
    /// Returns `(added, filled)`. A rejected investment leaves the loan
    /// unchanged and returns `(false, false)`. `filled` is true when the
    /// total now equals the principal exactly.
    pub fn add_investment(&mut self, investment: Investment) -> (bool, bool) {
        let total = match self.sum_investment().checked_add(investment.amount) {
            Some(total) if total <= self.amount => total,
            _ => return (false, false),
        };

        self.investments.push(investment);
        (true, total == self.amount)
    }

    /// Appends an approval or disbursement record.
    pub fn add_approval(&mut self, approval: Approval) {
        self.approvals.push(approval);
    }
}

// Lifecycle operations, dispatched on the current state.
impl Loan {
    /// Applies an approval. Returns false if not legal in the current state.
    pub fn approve(&mut self, approval: Approval) -> bool {
        let state = self.state;
        state.approve(self, approval)
    }

    /// Applies an investment. Returns false if not legal in the current
    /// state or if it would exceed the principal.
    pub fn invest(&mut self, investment: Investment) -> bool {
        let state = self.state;
        state.invest(self, investment)
    }

    /// Applies a disbursement. Returns false if not legal in the current state.
    pub fn disburse(&mut self, disbursement: Approval) -> bool {
        let state = self.state;
        state.disburse(self, disbursement)
    }
}

#[cfg(test)]
mod tests {
    use common::{EmployeeId, InvestorId};

    use super::*;

    fn loan(amount: i64) -> Loan {
        Loan::propose(LoanTerms::new(amount, 10.0, BorrowerId::new(1), "")).unwrap()
    }

    fn investment(amount: i64) -> Investment {
        Investment::new(LoanId::new(1), InvestorId::new(1), amount)
    }

    fn approval() -> Approval {
        Approval::new(EmployeeId::new(1), None, "doc")
    }

    #[test]
    fn test_propose_starts_proposed_with_roi() {
        let loan = loan(1000);
        assert_eq!(loan.state(), LoanState::Proposed);
        assert_eq!(loan.roi(), 100.0);
        assert_eq!(loan.id(), None);
        assert!(loan.investments().is_empty());
        assert!(loan.approvals().is_empty());
    }

    #[test]
    fn test_propose_rejects_invalid_terms() {
        let result = Loan::propose(LoanTerms::new(0, 10.0, BorrowerId::new(1), ""));
        assert_eq!(result, Err(LoanError::InvalidPrincipal(0)));
    }

    #[test]
    fn test_sum_investment_of_empty_loan_is_zero() {
        assert_eq!(loan(1000).sum_investment(), 0);
    }

    #[test]
    fn test_add_investment_under_principal() {
        let mut loan = loan(1000);
        assert_eq!(loan.add_investment(investment(400)), (true, false));
        assert_eq!(loan.add_investment(investment(300)), (true, false));
        assert_eq!(loan.sum_investment(), 700);
        assert_eq!(loan.remaining(), 300);
    }

    #[test]
    fn test_add_investment_filling_principal() {
        let mut loan = loan(1000);
        loan.add_investment(investment(600));
        assert_eq!(loan.add_investment(investment(400)), (true, true));
        assert_eq!(loan.sum_investment(), 1000);
    }

    #[test]
    fn test_add_investment_over_principal_is_rejected_without_mutation() {
        let mut loan = loan(1000);
        loan.add_investment(investment(600));
        let before = loan.clone();

        assert_eq!(loan.add_investment(investment(401)), (false, false));
        assert_eq!(loan, before);
        assert_eq!(loan.sum_investment(), 600);
    }

    #[test]
    fn test_sum_matches_accepted_investments() {
        let mut loan = loan(10_000);
        let amounts = [1200, 3300, 50, 9000, 2000, 1];
        let mut expected = 0;
        for amount in amounts {
            let (added, _) = loan.add_investment(investment(amount));
            if added {
                expected += amount;
            }
            assert_eq!(loan.sum_investment(), expected);
            assert!(loan.sum_investment() <= loan.amount());
        }
        assert_eq!(expected, 6551);
    }

    #[test]
    fn test_add_approval_is_unconditional() {
        let mut loan = loan(1000);
        loan.add_approval(approval());
        loan.add_approval(approval());
        assert_eq!(loan.approvals().len(), 2);
        assert_eq!(loan.state(), LoanState::Proposed);
    }

    #[test]
    fn test_restore_keeps_parts() {
        let restored = Loan::restore(
            LoanId::new(9),
            LoanTerms::new(1000, 5.0, BorrowerId::new(2), "https://docs/agreement.pdf"),
            50.0,
            LoanState::Approved,
            vec![investment(250)],
            vec![],
        );

        assert_eq!(restored.id(), Some(LoanId::new(9)));
        assert_eq!(restored.state(), LoanState::Approved);
        assert_eq!(restored.sum_investment(), 250);
        assert_eq!(restored.agreement_letter_url(), "https://docs/agreement.pdf");
    }
}
