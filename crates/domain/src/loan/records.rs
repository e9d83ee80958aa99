//! Records appended to a loan by lifecycle operations.

use chrono::{DateTime, Utc};
use common::{EmployeeId, InvestorId, LoanId};
use serde::{Deserialize, Serialize};

/// An amount committed by an investor toward a loan's principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    /// Loan being funded. Set by the service before persisting.
    #[serde(default)]
    pub loan_id: LoanId,

    /// Investor committing the funds.
    #[serde(default)]
    pub investor_id: InvestorId,

    /// Amount in minor currency units.
    #[serde(default)]
    pub amount: i64,
}

impl Investment {
    /// Creates an investment for a loan.
    pub fn new(loan_id: LoanId, investor_id: InvestorId, amount: i64) -> Self {
        Self {
            loan_id,
            investor_id,
            amount,
        }
    }

    /// Returns true if the investment cannot be applied: the investor is
    /// unset or the amount is not positive.
    pub fn is_empty(&self) -> bool {
        self.investor_id.is_unset() || self.amount <= 0
    }
}

/// The kind of signed action an [`Approval`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalAction {
    /// Field validation of a proposed loan.
    #[default]
    Approve,

    /// Release of the funded principal to the borrower.
    Disburse,
}

impl ApprovalAction {
    /// Returns the canonical persisted form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "APPROVE",
            ApprovalAction::Disburse => "DISBURSE",
        }
    }

    /// Parses the canonical persisted form.
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "APPROVE" => Some(ApprovalAction::Approve),
            "DISBURSE" => Some(ApprovalAction::Disburse),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signed action taken by an employee on a loan.
///
/// Used for both approvals and disbursements; `action` tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Loan the action applies to. Set by the service before persisting.
    #[serde(default)]
    pub loan_id: LoanId,

    /// Employee who signed the action.
    #[serde(default)]
    pub employee_id: EmployeeId,

    /// When the action was taken.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// Approval or disbursement. Set by the service from the operation invoked.
    #[serde(default)]
    pub action: ApprovalAction,

    /// Reference to the supporting document (visit photo, signed agreement).
    #[serde(default)]
    pub document_url: String,
}

impl Approval {
    /// Creates an approval record signed by an employee.
    pub fn new(
        employee_id: EmployeeId,
        date: Option<DateTime<Utc>>,
        document_url: impl Into<String>,
    ) -> Self {
        Self {
            loan_id: LoanId::default(),
            employee_id,
            date,
            action: ApprovalAction::default(),
            document_url: document_url.into(),
        }
    }

    /// Returns true if the record cannot be applied: the employee is unset,
    /// or neither a date nor a document is present.
    pub fn is_empty(&self) -> bool {
        self.employee_id.is_unset() || (self.date.is_none() && self.document_url.is_empty())
    }
}
