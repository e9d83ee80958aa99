use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{BorrowerId, InvestorId, LoanId};
use domain::{Approval, Investment, Loan, LoanState, LoanTerms};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{Guard, Investor, LoanRepository},
};

/// A loan as the store keeps it: one row plus its child records.
#[derive(Debug, Clone)]
struct LoanRow {
    terms: LoanTerms,
    roi: f64,
    state: LoanState,
    investments: Vec<Investment>,
    approvals: Vec<Approval>,
}

impl LoanRow {
    fn to_loan(&self, id: LoanId) -> Loan {
        Loan::restore(
            id,
            self.terms.clone(),
            self.roi,
            self.state,
            self.investments.clone(),
            self.approvals.clone(),
        )
    }

    fn invested(&self) -> i64 {
        self.investments.iter().map(|i| i.amount).sum()
    }
}

#[derive(Debug, Default)]
struct Tables {
    loans: BTreeMap<LoanId, LoanRow>,
    investors: HashMap<InvestorId, Investor>,
    last_id: i64,
}

impl Tables {
    /// Returns the row if it still matches the guard's state.
    fn guarded_row(&mut self, guard: Guard) -> Result<&mut LoanRow> {
        let row = self
            .loans
            .get_mut(&guard.loan_id)
            .ok_or(StoreError::LoanNotFound(guard.loan_id))?;

        if row.state != guard.state {
            return Err(guard.conflict());
        }

        Ok(row)
    }

    /// Like [`Tables::guarded_row`], also matching the invested total.
    fn guarded_investment_row(&mut self, guard: Guard) -> Result<&mut LoanRow> {
        let row = self.guarded_row(guard)?;
        if row.invested() != guard.invested {
            return Err(guard.conflict());
        }
        Ok(row)
    }
}

/// In-memory loan store.
///
/// Provides the same interface and guarantees as the PostgreSQL store.
/// Each write holds the table lock for its whole duration, which makes the
/// guard check and the write a single atomic step.
#[derive(Clone, Default)]
pub struct InMemoryLoanStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLoanStore {
    /// Creates a new empty in-memory loan store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces an investor's contact details.
    pub async fn save_investor(&self, investor: Investor) {
        self.tables
            .write()
            .await
            .investors
            .insert(investor.id, investor);
    }

    /// Returns the number of loans stored.
    pub async fn loan_count(&self) -> usize {
        self.tables.read().await.loans.len()
    }

    /// Clears all loans and investors.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        *tables = Tables::default();
    }

    async fn select<F>(&self, predicate: F) -> Vec<Loan>
    where
        F: Fn(&LoanRow) -> bool,
    {
        let tables = self.tables.read().await;
        tables
            .loans
            .iter()
            .filter(|(_, row)| predicate(row))
            .map(|(id, row)| row.to_loan(*id))
            .collect()
    }
}

#[async_trait]
impl LoanRepository for InMemoryLoanStore {
    async fn insert_loan(&self, loan: &Loan) -> Result<LoanId> {
        let mut tables = self.tables.write().await;
        tables.last_id += 1;
        let id = LoanId::new(tables.last_id);

        tables.loans.insert(
            id,
            LoanRow {
                terms: loan.terms(),
                roi: loan.roi(),
                state: loan.state(),
                investments: loan
                    .investments()
                    .iter()
                    .cloned()
                    .map(|mut investment| {
                        investment.loan_id = id;
                        investment
                    })
                    .collect(),
                approvals: loan
                    .approvals()
                    .iter()
                    .cloned()
                    .map(|mut approval| {
                        approval.loan_id = id;
                        approval
                    })
                    .collect(),
            },
        );

        Ok(id)
    }

    async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.get(&id).map(|row| row.to_loan(id)))
    }

    async fn update_state(&self, guard: Guard, next: LoanState) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables.guarded_row(guard)?;
        row.state = next;
        Ok(())
    }

    async fn insert_investment(&self, investment: &Investment, guard: Guard) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables.guarded_investment_row(guard)?;
        row.investments.push(investment.clone());
        Ok(())
    }

    async fn insert_investment_and_update_state(
        &self,
        investment: &Investment,
        guard: Guard,
        next: LoanState,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables.guarded_investment_row(guard)?;
        row.investments.push(investment.clone());
        row.state = next;
        Ok(())
    }

    async fn insert_approval_and_update_state(
        &self,
        approval: &Approval,
        guard: Guard,
        next: LoanState,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables.guarded_row(guard)?;
        row.approvals.push(approval.clone());
        row.state = next;
        Ok(())
    }

    async fn loans_by_state(&self, state: LoanState) -> Result<Vec<Loan>> {
        Ok(self.select(|row| row.state == state).await)
    }

    async fn loans_by_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Loan>> {
        Ok(self
            .select(|row| row.terms.borrower_id == borrower_id)
            .await)
    }

    async fn loans_by_investor(&self, investor_id: InvestorId) -> Result<Vec<Loan>> {
        Ok(self
            .select(|row| row.investments.iter().any(|i| i.investor_id == investor_id))
            .await)
    }

    async fn investors_by_loan(&self, loan_id: LoanId) -> Result<Vec<Investor>> {
        let tables = self.tables.read().await;
        let Some(row) = tables.loans.get(&loan_id) else {
            return Ok(Vec::new());
        };

        let mut investors: Vec<Investor> = Vec::new();
        for investment in &row.investments {
            if investors.iter().any(|i| i.id == investment.investor_id) {
                continue;
            }
            if let Some(investor) = tables.investors.get(&investment.investor_id) {
                investors.push(investor.clone());
            }
        }

        Ok(investors)
    }
}
