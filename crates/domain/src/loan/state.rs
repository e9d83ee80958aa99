//! Loan lifecycle state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Approval, Investment, Loan};
use crate::error::LoanError;

/// The state of a loan in its lifecycle.
///
/// State transitions:
/// ```text
/// Proposed ──approve──► Approved ──invest (fully funded)──► Invested ──disburse──► Disbursed
///                          │  ▲
///                          └──┘ invest (partial)
/// ```
///
/// Each operation is legal in exactly one state. An illegal operation
/// returns `false` and leaves the loan untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanState {
    /// Initial state: the loan awaits field validation.
    #[default]
    Proposed,

    /// Validated by an employee; open for investment.
    Approved,

    /// Investments have reached the principal exactly.
    Invested,

    /// Funds released to the borrower (terminal state).
    Disbursed,
}

impl LoanState {
    /// All states in lifecycle order.
    pub const ALL: [LoanState; 4] = [
        LoanState::Proposed,
        LoanState::Approved,
        LoanState::Invested,
        LoanState::Disbursed,
    ];

    /// Records an approval and moves a proposed loan to approved.
    pub fn approve(self, loan: &mut Loan, approval: Approval) -> bool {
        match self {
            LoanState::Proposed => {
                loan.add_approval(approval);
                loan.set_state(LoanState::Approved);
                true
            }
            LoanState::Approved | LoanState::Invested | LoanState::Disbursed => false,
        }
    }

    /// Adds an investment to an approved loan.
    ///
    /// Returns true whenever the investment is accepted. The loan moves to
    /// invested only when the investment fills the principal exactly.
    pub fn invest(self, loan: &mut Loan, investment: Investment) -> bool {
        match self {
            LoanState::Approved => {
                let (added, filled) = loan.add_investment(investment);
                if added && filled {
                    loan.set_state(LoanState::Invested);
                }
                added
            }
            LoanState::Proposed | LoanState::Invested | LoanState::Disbursed => false,
        }
    }

    /// Records a disbursement and moves an invested loan to disbursed.
    pub fn disburse(self, loan: &mut Loan, disbursement: Approval) -> bool {
        match self {
            LoanState::Invested => {
                loan.add_approval(disbursement);
                loan.set_state(LoanState::Disbursed);
                true
            }
            LoanState::Proposed | LoanState::Approved | LoanState::Disbursed => false,
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanState::Disbursed)
    }

    /// Returns the canonical persisted tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Proposed => "PROPOSED",
            LoanState::Approved => "APPROVED",
            LoanState::Invested => "INVESTED",
            LoanState::Disbursed => "DISBURSED",
        }
    }
}

impl std::fmt::Display for LoanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LoanState {
    type Err = LoanError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        match code {
            "PROPOSED" => Ok(LoanState::Proposed),
            "APPROVED" => Ok(LoanState::Approved),
            "INVESTED" => Ok(LoanState::Invested),
            "DISBURSED" => Ok(LoanState::Disbursed),
            other => Err(LoanError::UnknownState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_proposed() {
        assert_eq!(LoanState::default(), LoanState::Proposed);
    }

    #[test]
    fn test_round_trip_through_tag() {
        for state in LoanState::ALL {
            assert_eq!(state.as_str().parse::<LoanState>(), Ok(state));
            assert_eq!(state.to_string().parse::<LoanState>(), Ok(state));
        }
    }

    #[test]
    fn test_unknown_tag_fails_closed() {
        for code in ["", "proposed", "CANCELLED", " APPROVED"] {
            assert_eq!(
                code.parse::<LoanState>(),
                Err(LoanError::UnknownState(code.to_string()))
            );
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!LoanState::Proposed.is_terminal());
        assert!(!LoanState::Approved.is_terminal());
        assert!(!LoanState::Invested.is_terminal());
        assert!(LoanState::Disbursed.is_terminal());
    }

    #[test]
    fn test_serialization_uses_canonical_tags() {
        let json = serde_json::to_string(&LoanState::Invested).unwrap();
        assert_eq!(json, "\"INVESTED\"");

        let state: LoanState = serde_json::from_str("\"DISBURSED\"").unwrap();
        assert_eq!(state, LoanState::Disbursed);

        assert!(serde_json::from_str::<LoanState>("\"UNKNOWN\"").is_err());
    }
}
