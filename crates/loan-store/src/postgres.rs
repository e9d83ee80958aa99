use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BorrowerId, EmployeeId, InvestorId, LoanId};
use domain::{Approval, ApprovalAction, Investment, Loan, LoanState, LoanTerms};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    Result, StoreError,
    store::{Guard, Investor, LoanRepository},
};

const LOAN_COLUMNS: &str =
    "id, amount, rate, roi, borrower_id, agreement_letter_url, state";

/// PostgreSQL-backed loan store implementation.
#[derive(Clone)]
pub struct PostgresLoanStore {
    pool: PgPool,
}

impl PostgresLoanStore {
    /// Creates a new PostgreSQL loan store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Stores an investor's contact details and returns the generated ID.
    pub async fn save_investor(&self, name: &str, email: &str) -> Result<InvestorId> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO investors (name, email) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(email)
                .fetch_one(&self.pool)
                .await?;

        Ok(InvestorId::new(id))
    }

    fn row_to_investment(row: &PgRow) -> Result<Investment> {
        Ok(Investment::new(
            LoanId::new(row.try_get("loan_id")?),
            InvestorId::new(row.try_get("investor_id")?),
            row.try_get("amount")?,
        ))
    }

    fn row_to_approval(row: &PgRow) -> Result<Approval> {
        let action: String = row.try_get("action")?;
        let action = ApprovalAction::parse(&action).ok_or(StoreError::InvalidRecord(action))?;

        Ok(Approval {
            loan_id: LoanId::new(row.try_get("loan_id")?),
            employee_id: EmployeeId::new(row.try_get("employee_id")?),
            date: row.try_get::<Option<DateTime<Utc>>, _>("approved_at")?,
            action,
            document_url: row.try_get("document_url")?,
        })
    }

    /// Loads the investments and approvals of `rows` and assembles loans,
    /// keeping the row order.
    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Loan>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut investments: HashMap<i64, Vec<Investment>> = HashMap::new();
        let investment_rows = sqlx::query(
            r#"
            SELECT loan_id, investor_id, amount
            FROM loan_investments
            WHERE loan_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in &investment_rows {
            let investment = Self::row_to_investment(row)?;
            investments
                .entry(investment.loan_id.as_i64())
                .or_default()
                .push(investment);
        }

        let mut approvals: HashMap<i64, Vec<Approval>> = HashMap::new();
        let approval_rows = sqlx::query(
            r#"
            SELECT loan_id, employee_id, approved_at, action, document_url
            FROM loan_approvals
            WHERE loan_id = ANY($1)
            ORDER BY id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in &approval_rows {
            let approval = Self::row_to_approval(row)?;
            approvals
                .entry(approval.loan_id.as_i64())
                .or_default()
                .push(approval);
        }

        rows.into_iter()
            .map(|row| -> Result<Loan> {
                let id: i64 = row.try_get("id")?;
                let state: String = row.try_get("state")?;
                let terms = LoanTerms::new(
                    row.try_get("amount")?,
                    row.try_get("rate")?,
                    BorrowerId::new(row.try_get("borrower_id")?),
                    row.try_get::<String, _>("agreement_letter_url")?,
                );

                Ok(Loan::restore(
                    LoanId::new(id),
                    terms,
                    row.try_get("roi")?,
                    state.parse::<LoanState>()?,
                    investments.remove(&id).unwrap_or_default(),
                    approvals.remove(&id).unwrap_or_default(),
                ))
            })
            .collect()
    }

    /// Moves the loan to `next` inside `tx` if it is still in `guard.state`.
    async fn compare_and_set_state(
        tx: &mut Transaction<'_, Postgres>,
        guard: Guard,
        next: LoanState,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE loans SET state = $1 WHERE id = $2 AND state = $3")
            .bind(next.as_str())
            .bind(guard.loan_id.as_i64())
            .bind(guard.state.as_str())
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Self::missing_or_conflict(tx, guard).await);
        }

        Ok(())
    }

    /// Distinguishes a deleted loan from a stale guard after a failed write.
    async fn missing_or_conflict(tx: &mut Transaction<'_, Postgres>, guard: Guard) -> StoreError {
        let exists: std::result::Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM loans WHERE id = $1)")
                .bind(guard.loan_id.as_i64())
                .fetch_one(&mut **tx)
                .await;

        match exists {
            Ok(false) => StoreError::LoanNotFound(guard.loan_id),
            Ok(true) => guard.conflict(),
            Err(e) => StoreError::Database(e),
        }
    }

    /// Locks the loan row and checks both the state and the invested total.
    async fn lock_for_investment(tx: &mut Transaction<'_, Postgres>, guard: Guard) -> Result<()> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM loans WHERE id = $1 FOR UPDATE")
                .bind(guard.loan_id.as_i64())
                .fetch_optional(&mut **tx)
                .await?;

        let Some(state) = state else {
            return Err(StoreError::LoanNotFound(guard.loan_id));
        };
        if state.parse::<LoanState>()? != guard.state {
            return Err(guard.conflict());
        }

        let invested: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM loan_investments WHERE loan_id = $1",
        )
        .bind(guard.loan_id.as_i64())
        .fetch_one(&mut **tx)
        .await?;

        if invested != guard.invested {
            return Err(guard.conflict());
        }

        Ok(())
    }

    async fn write_investment(
        tx: &mut Transaction<'_, Postgres>,
        investment: &Investment,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loan_investments (loan_id, investor_id, amount)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(investment.loan_id.as_i64())
        .bind(investment.investor_id.as_i64())
        .bind(investment.amount)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn write_approval(tx: &mut Transaction<'_, Postgres>, approval: &Approval) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loan_approvals (loan_id, employee_id, approved_at, action, document_url)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(approval.loan_id.as_i64())
        .bind(approval.employee_id.as_i64())
        .bind(approval.date)
        .bind(approval.action.as_str())
        .bind(&approval.document_url)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LoanRepository for PostgresLoanStore {
    async fn insert_loan(&self, loan: &Loan) -> Result<LoanId> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO loans (amount, rate, roi, borrower_id, agreement_letter_url, state)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(loan.amount())
        .bind(loan.rate())
        .bind(loan.roi())
        .bind(loan.borrower_id().as_i64())
        .bind(loan.agreement_letter_url())
        .bind(loan.state().as_str())
        .fetch_one(&mut *tx)
        .await?;

        let loan_id = LoanId::new(id);
        for investment in loan.investments() {
            let mut investment = investment.clone();
            investment.loan_id = loan_id;
            Self::write_investment(&mut tx, &investment).await?;
        }
        for approval in loan.approvals() {
            let mut approval = approval.clone();
            approval.loan_id = loan_id;
            Self::write_approval(&mut tx, &approval).await?;
        }

        tx.commit().await?;
        tracing::debug!(%loan_id, "Inserted loan");
        Ok(loan_id)
    }

    async fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1"))
                .bind(id.as_i64())
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_state(&self, guard: Guard, next: LoanState) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::compare_and_set_state(&mut tx, guard, next).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_investment(&self, investment: &Investment, guard: Guard) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::lock_for_investment(&mut tx, guard).await?;
        Self::write_investment(&mut tx, investment).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_investment_and_update_state(
        &self,
        investment: &Investment,
        guard: Guard,
        next: LoanState,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::lock_for_investment(&mut tx, guard).await?;
        Self::write_investment(&mut tx, investment).await?;
        Self::compare_and_set_state(&mut tx, guard, next).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_approval_and_update_state(
        &self,
        approval: &Approval,
        guard: Guard,
        next: LoanState,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Dropping the transaction on error rolls the update back.
        Self::compare_and_set_state(&mut tx, guard, next).await?;

        Self::write_approval(&mut tx, approval).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn loans_by_state(&self, state: LoanState) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE state = $1 ORDER BY id ASC"
        ))
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn loans_by_borrower(&self, borrower_id: BorrowerId) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE borrower_id = $1 ORDER BY id ASC"
        ))
        .bind(borrower_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn loans_by_investor(&self, investor_id: InvestorId) -> Result<Vec<Loan>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOAN_COLUMNS} FROM loans
            WHERE id IN (SELECT loan_id FROM loan_investments WHERE investor_id = $1)
            ORDER BY id ASC
            "#
        ))
        .bind(investor_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn investors_by_loan(&self, loan_id: LoanId) -> Result<Vec<Investor>> {
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.name, i.email
            FROM investors i
            WHERE i.id IN (SELECT investor_id FROM loan_investments WHERE loan_id = $1)
            ORDER BY i.id ASC
            "#,
        )
        .bind(loan_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Investor> {
                Ok(Investor::new(
                    InvestorId::new(row.try_get("id")?),
                    row.try_get::<String, _>("name")?,
                    row.try_get::<String, _>("email")?,
                ))
            })
            .collect()
    }
}
