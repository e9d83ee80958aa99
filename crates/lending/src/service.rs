//! Loan service providing the lifecycle API.

use std::sync::Arc;

use common::{BorrowerId, InvestorId, LoanId};
use domain::{Approval, ApprovalAction, Investment, Loan, LoanState, LoanTerms};
use loan_store::{Guard, LoanRepository, StoreError};

use crate::dispatch::{NotificationDispatcher, NotificationJob};
use crate::error::{Result, ServiceError};
use crate::notifier::Notifier;

/// Runtime settings for [`LoanService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Times an operation is retried on a fresh load after a write conflict.
    pub conflict_retries: u32,

    /// Sender address of notification emails.
    pub sender: String,

    /// Capacity of the notification queue.
    pub queue_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 1,
            sender: "loans@localhost".to_string(),
            queue_capacity: 256,
        }
    }
}

/// A lifecycle operation with the record it appends.
#[derive(Debug, Clone)]
enum Operation {
    Approve(Approval),
    Invest(Investment),
    Disburse(Approval),
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Approve(_) => "approve",
            Operation::Invest(_) => "invest",
            Operation::Disburse(_) => "disburse",
        }
    }

    fn apply(&self, loan: &mut Loan) -> bool {
        match self {
            Operation::Approve(approval) => loan.approve(approval.clone()),
            Operation::Invest(investment) => loan.invest(investment.clone()),
            Operation::Disburse(approval) => loan.disburse(approval.clone()),
        }
    }

    async fn persist<R>(&self, repository: &R, guard: Guard, next: LoanState) -> loan_store::Result<()>
    where
        R: LoanRepository + ?Sized,
    {
        match self {
            Operation::Approve(approval) | Operation::Disburse(approval) => {
                repository
                    .insert_approval_and_update_state(approval, guard, next)
                    .await
            }
            Operation::Invest(investment) if next != guard.state => {
                repository
                    .insert_investment_and_update_state(investment, guard, next)
                    .await
            }
            Operation::Invest(investment) => repository.insert_investment(investment, guard).await,
        }
    }
}

/// Service for managing loans.
///
/// Each lifecycle operation loads the loan, applies the operation through the
/// state machine and persists the appended record together with any state
/// change. An operation that is not legal returns `Ok(None)` and writes
/// nothing.
pub struct LoanService<R: LoanRepository> {
    repository: Arc<R>,
    dispatcher: NotificationDispatcher,
    config: ServiceConfig,
}

impl<R: LoanRepository + 'static> LoanService<R> {
    /// Creates a loan service and starts its notification worker.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(repository: R, notifier: Arc<dyn Notifier>, config: ServiceConfig) -> Self {
        let repository = Arc::new(repository);
        let dispatcher = NotificationDispatcher::spawn(
            Arc::clone(&repository),
            notifier,
            config.sender.clone(),
            config.queue_capacity,
        );

        Self {
            repository,
            dispatcher,
            config,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Returns the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Proposes a new loan and persists it.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, terms: LoanTerms) -> Result<Loan> {
        let mut loan = Loan::propose(terms)?;

        let id = self.repository.insert_loan(&loan).await.map_err(|e| {
            tracing::error!(error = %e, "failed to insert loan");
            e
        })?;
        loan.assign_id(id);

        metrics::counter!("loans_created_total").increment(1);
        tracing::info!(loan_id = %id, amount = loan.amount(), "loan proposed");
        Ok(loan)
    }

    /// Loads a loan by ID.
    ///
    /// Returns None if the loan doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.repository.get_loan(id).await?)
    }

    /// Approves a proposed loan.
    ///
    /// Returns None if the approval is incomplete or the loan is not proposed.
    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, id: LoanId, mut approval: Approval) -> Result<Option<Loan>> {
        if approval.is_empty() {
            return Ok(None);
        }
        approval.loan_id = id;
        approval.action = ApprovalAction::Approve;

        self.execute(id, Operation::Approve(approval)).await
    }

    /// Invests in an approved loan.
    ///
    /// Returns None if the investment is incomplete, the loan is not approved,
    /// or the amount exceeds what remains of the principal. When the
    /// investment fills the loan, its investors are notified.
    #[tracing::instrument(skip(self))]
    pub async fn invest(&self, id: LoanId, mut investment: Investment) -> Result<Option<Loan>> {
        if investment.is_empty() {
            return Ok(None);
        }
        investment.loan_id = id;

        let loan = self.execute(id, Operation::Invest(investment)).await?;

        if let Some(loan) = &loan
            && loan.state() == LoanState::Invested
        {
            self.dispatcher
                .submit(NotificationJob {
                    loan_id: id,
                    agreement_letter_url: loan.agreement_letter_url().to_string(),
                })
                .await;
        }

        Ok(loan)
    }

    /// Disburses an invested loan.
    ///
    /// Returns None if the disbursement is incomplete or the loan is not
    /// invested.
    #[tracing::instrument(skip(self))]
    pub async fn disburse(&self, id: LoanId, mut approval: Approval) -> Result<Option<Loan>> {
        if approval.is_empty() {
            return Ok(None);
        }
        approval.loan_id = id;
        approval.action = ApprovalAction::Disburse;

        self.execute(id, Operation::Disburse(approval)).await
    }

    /// Lists loans currently in a state.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_state(&self, state: LoanState) -> Result<Vec<Loan>> {
        Ok(self.repository.loans_by_state(state).await?)
    }

    /// Lists loans requested by a borrower.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Loan>> {
        Ok(self.repository.loans_by_borrower(borrower_id).await?)
    }

    /// Lists loans an investor has invested in.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_investor(&self, investor_id: InvestorId) -> Result<Vec<Loan>> {
        Ok(self.repository.loans_by_investor(investor_id).await?)
    }

    /// Stops accepting notifications and waits for queued ones to be delivered.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }

    /// Loads, applies and persists an operation, retrying on write conflicts.
    async fn execute(&self, id: LoanId, operation: Operation) -> Result<Option<Loan>> {
        let action = operation.name();
        let mut attempt = 0;

        loop {
            let Some(mut loan) = self.repository.get_loan(id).await? else {
                return Err(ServiceError::LoanNotFound(id));
            };

            let guard = Guard::of(id, &loan);
            if !operation.apply(&mut loan) {
                metrics::counter!("loan_operations_rejected_total", "action" => action)
                    .increment(1);
                tracing::debug!(loan_id = %id, state = %guard.state, action, "operation rejected");
                return Ok(None);
            }

            let next = loan.state();
            match operation.persist(self.repository.as_ref(), guard, next).await {
                Ok(()) => {
                    if next != guard.state {
                        metrics::counter!(
                            "loan_transitions_total",
                            "action" => action,
                            "to" => next.as_str()
                        )
                        .increment(1);
                        tracing::info!(loan_id = %id, from = %guard.state, to = %next, "loan transitioned");
                    }
                    return Ok(Some(loan));
                }
                Err(e @ StoreError::Conflict { .. }) => {
                    metrics::counter!("loan_conflicts_total", "action" => action).increment(1);
                    if attempt >= self.config.conflict_retries {
                        tracing::warn!(loan_id = %id, action, error = %e, "giving up after conflict");
                        return Err(e.into());
                    }
                    attempt += 1;
                    tracing::debug!(loan_id = %id, action, attempt, "retrying after conflict");
                }
                Err(StoreError::LoanNotFound(id)) => return Err(ServiceError::LoanNotFound(id)),
                Err(e) => {
                    tracing::error!(loan_id = %id, action, error = %e, "failed to persist loan");
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use common::EmployeeId;
    use loan_store::InMemoryLoanStore;

    use super::*;
    use crate::notifier::InMemoryNotifier;

    fn service() -> LoanService<InMemoryLoanStore> {
        LoanService::new(
            InMemoryLoanStore::new(),
            Arc::new(InMemoryNotifier::new()),
            ServiceConfig::default(),
        )
    }

    fn terms(amount: i64) -> LoanTerms {
        LoanTerms::new(amount, 10.0, BorrowerId::new(1), "https://docs/agreement.pdf")
    }

    fn approval() -> Approval {
        Approval::new(EmployeeId::new(3), None, "https://docs/visit.jpg")
    }

    #[test]
    fn default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.conflict_retries, 1);
        assert_eq!(config.sender, "loans@localhost");
        assert_eq!(config.queue_capacity, 256);
    }

    #[tokio::test]
    async fn create_assigns_id() {
        let service = service();
        let loan = service.create(terms(1000)).await.unwrap();

        assert!(loan.id().is_some());
        assert_eq!(loan.state(), LoanState::Proposed);
        assert_eq!(loan.roi(), 100.0);
    }

    #[tokio::test]
    async fn create_rejects_invalid_terms() {
        let service = service();
        let result = service.create(terms(0)).await;
        assert!(matches!(result, Err(ServiceError::InvalidTerms(_))));
        assert_eq!(service.repository().loan_count().await, 0);
    }

    #[tokio::test]
    async fn approve_sets_loan_and_action() {
        let service = service();
        let id = service.create(terms(1000)).await.unwrap().id().unwrap();

        let loan = service.approve(id, approval()).await.unwrap().unwrap();
        let record = &loan.approvals()[0];
        assert_eq!(record.loan_id, id);
        assert_eq!(record.action, ApprovalAction::Approve);
    }

    #[tokio::test]
    async fn incomplete_records_are_rejected_before_loading() {
        let service = service();
        let missing = LoanId::new(99);

        let empty_approval = Approval::new(EmployeeId::new(0), None, "doc");
        assert!(service.approve(missing, empty_approval).await.unwrap().is_none());

        let empty_investment = Investment::new(missing, InvestorId::new(1), 0);
        assert!(service.invest(missing, empty_investment).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn operations_on_missing_loan_are_not_found() {
        let service = service();
        let result = service.approve(LoanId::new(5), approval()).await;
        assert!(matches!(result, Err(ServiceError::LoanNotFound(_))));
    }
}
