//! Loan lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{BorrowerId, EmployeeId, InvestorId, LoanId};
use domain::{Approval, Investment, Loan, LoanState, LoanTerms};
use lending::LoanService;
use loan_store::LoanRepository;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<R: LoanRepository> {
    pub service: LoanService<R>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateLoanRequest {
    pub amount: i64,
    pub rate: f64,
    pub borrower_id: i64,
    #[serde(default)]
    pub agreement_letter_url: String,
}

/// Body of both approval and disbursement requests.
#[derive(Deserialize)]
pub struct ApprovalRequest {
    #[serde(default)]
    pub employee_id: i64,
    #[serde(default)]
    pub document_url: String,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct InvestRequest {
    #[serde(default)]
    pub investor_id: i64,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct ListLoansQuery {
    pub state: Option<String>,
    pub borrower: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct LoanResponse {
    pub id: i64,
    pub amount: i64,
    pub rate: f64,
    pub roi: f64,
    pub borrower_id: i64,
    pub agreement_letter_url: String,
    pub state: LoanState,
    pub invested: i64,
    pub investments: Vec<InvestmentResponse>,
    pub approvals: Vec<ApprovalResponse>,
}

#[derive(Serialize)]
pub struct InvestmentResponse {
    pub investor_id: i64,
    pub amount: i64,
}

#[derive(Serialize)]
pub struct ApprovalResponse {
    pub employee_id: i64,
    pub action: String,
    pub date: Option<DateTime<Utc>>,
    pub document_url: String,
}

impl From<&Loan> for LoanResponse {
    fn from(loan: &Loan) -> Self {
        Self {
            id: loan.id().map(i64::from).unwrap_or_default(),
            amount: loan.amount(),
            rate: loan.rate(),
            roi: loan.roi(),
            borrower_id: loan.borrower_id().as_i64(),
            agreement_letter_url: loan.agreement_letter_url().to_string(),
            state: loan.state(),
            invested: loan.sum_investment(),
            investments: loan
                .investments()
                .iter()
                .map(|i| InvestmentResponse {
                    investor_id: i.investor_id.as_i64(),
                    amount: i.amount,
                })
                .collect(),
            approvals: loan
                .approvals()
                .iter()
                .map(|a| ApprovalResponse {
                    employee_id: a.employee_id.as_i64(),
                    action: a.action.to_string(),
                    date: a.date,
                    document_url: a.document_url.clone(),
                })
                .collect(),
        }
    }
}

fn to_responses(loans: &[Loan]) -> Vec<LoanResponse> {
    loans.iter().map(LoanResponse::from).collect()
}

fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadRequest(format!("Invalid {what}: {raw}"))),
    }
}

impl ApprovalRequest {
    /// Validates the payload and stamps the current time when no date is given.
    fn into_approval(self) -> Result<Approval, ApiError> {
        if self.employee_id <= 0 {
            return Err(ApiError::BadRequest("employee_id is required".to_string()));
        }
        if self.document_url.trim().is_empty() {
            return Err(ApiError::BadRequest("document_url is required".to_string()));
        }

        Ok(Approval::new(
            EmployeeId::new(self.employee_id),
            Some(self.date.unwrap_or_else(Utc::now)),
            self.document_url,
        ))
    }
}

// -- Handlers --

/// POST /loans: propose a new loan.
#[tracing::instrument(skip(state, req))]
pub async fn create<R: LoanRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let terms = LoanTerms::new(
        req.amount,
        req.rate,
        BorrowerId::new(req.borrower_id),
        req.agreement_letter_url,
    );

    let loan = state.service.create(terms).await?;
    Ok((StatusCode::CREATED, Json(LoanResponse::from(&loan))))
}

/// GET /loans/:id: load a loan with its investments and approvals.
#[tracing::instrument(skip(state))]
pub async fn get<R: LoanRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = LoanId::new(parse_id(&id, "loan id")?);
    let loan = state
        .service
        .get(loan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Loan {id} not found")))?;

    Ok(Json(LoanResponse::from(&loan)))
}

/// GET /loans?state=|borrower=: list loans by state or by borrower.
#[tracing::instrument(skip(state, query))]
pub async fn list<R: LoanRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Query(query): Query<ListLoansQuery>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let loans = match (query.state, query.borrower) {
        (Some(code), _) => {
            let loan_state = code
                .parse::<LoanState>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            state.service.list_by_state(loan_state).await?
        }
        (None, Some(borrower)) => {
            let borrower_id = BorrowerId::new(parse_id(&borrower, "borrower id")?);
            state.service.list_by_borrower(borrower_id).await?
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "state or borrower query parameter is required".to_string(),
            ));
        }
    };

    Ok(Json(to_responses(&loans)))
}

/// PATCH /loans/:id/approve: approve a proposed loan.
#[tracing::instrument(skip(state, req))]
pub async fn approve<R: LoanRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<ApprovalRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = LoanId::new(parse_id(&id, "loan id")?);
    let approval = req.into_approval()?;

    let loan = state
        .service
        .approve(loan_id, approval)
        .await?
        .ok_or_else(ApiError::invalid_for_state)?;

    Ok(Json(LoanResponse::from(&loan)))
}

/// PATCH /loans/:id/invest: invest in an approved loan.
#[tracing::instrument(skip(state, req))]
pub async fn invest<R: LoanRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<InvestRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = LoanId::new(parse_id(&id, "loan id")?);
    if req.investor_id <= 0 || req.amount <= 0 {
        return Err(ApiError::BadRequest(
            "investor_id and a positive amount are required".to_string(),
        ));
    }

    let investment = Investment::new(loan_id, InvestorId::new(req.investor_id), req.amount);
    let loan = state
        .service
        .invest(loan_id, investment)
        .await?
        .ok_or_else(ApiError::invalid_for_state)?;

    Ok(Json(LoanResponse::from(&loan)))
}

/// PATCH /loans/:id/disburse: release an invested loan to the borrower.
#[tracing::instrument(skip(state, req))]
pub async fn disburse<R: LoanRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
    Json(req): Json<ApprovalRequest>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = LoanId::new(parse_id(&id, "loan id")?);
    let disbursement = req.into_approval()?;

    let loan = state
        .service
        .disburse(loan_id, disbursement)
        .await?
        .ok_or_else(ApiError::invalid_for_state)?;

    Ok(Json(LoanResponse::from(&loan)))
}

/// GET /investors/:id/loans: list the loans an investor has funded.
#[tracing::instrument(skip(state))]
pub async fn by_investor<R: LoanRepository + 'static>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let investor_id = InvestorId::new(parse_id(&id, "investor id")?);
    let loans = state.service.list_by_investor(investor_id).await?;

    Ok(Json(to_responses(&loans)))
}
