/// serialization support for loans
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::custody::Custody;
use crate::errors::{LedgerError, Result};
use crate::ledger::LoanLedger;
use crate::state::Loan;
use crate::types::{Address, CollateralId, LoanId, LoanStatus};

/// flat view of a loan record as a client renders it
///
/// Amounts are in ether, rates in percent, and timestamps in unix seconds
/// with 0 standing for "not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanView {
    pub loan_id: LoanId,
    pub token_address: Address,
    pub token_owner: Address,
    pub lender: Address,
    pub token_id: CollateralId,
    pub interest_rate: Decimal,
    pub loan_amount: Decimal,
    pub max_loan_amount: Decimal,
    pub loan_amount_drawn: Decimal,
    pub first_bid_time: i64,
    pub last_bid_time: i64,
    pub historic_interest: Decimal,
    pub loan_complete_time: i64,
    pub status: LoanStatus,
}

fn unix_or_zero(time: Option<DateTime<Utc>>) -> i64 {
    time.map(|t| t.timestamp()).unwrap_or(0)
}

impl LoanView {
    pub fn from_loan(loan_id: LoanId, loan: &Loan, now: DateTime<Utc>) -> Self {
        LoanView {
            loan_id,
            token_address: loan.collateral_asset,
            token_owner: loan.collateral_owner,
            lender: loan.lender,
            token_id: loan.collateral_id,
            interest_rate: loan.interest_rate.as_percentage(),
            loan_amount: loan.loan_amount.to_ether(),
            max_loan_amount: loan.max_loan_amount.to_ether(),
            loan_amount_drawn: loan.loan_amount_drawn.to_ether(),
            first_bid_time: unix_or_zero(loan.first_bid_time),
            last_bid_time: unix_or_zero(loan.last_bid_time),
            historic_interest: loan.historic_interest.to_ether(),
            loan_complete_time: loan.loan_complete_time.timestamp(),
            status: loan.status(now),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// every loan on the ledger, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerView {
    pub loans: Vec<LoanView>,
}

impl LedgerView {
    pub fn all<C: Custody>(ledger: &LoanLedger<C>, now: DateTime<Utc>) -> Self {
        let mut loans: Vec<LoanView> = ledger
            .loans()
            .map(|(loan_id, loan)| LoanView::from_loan(loan_id, loan, now))
            .collect();
        loans.reverse();
        LedgerView { loans }
    }

    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// whether an action can be taken, and if not, why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Availability::Available => None,
            Availability::Unavailable(reason) => Some(reason),
        }
    }
}

impl From<Result<()>> for Availability {
    fn from(check: Result<()>) -> Self {
        match check {
            Ok(()) => Availability::Available,
            Err(err) => Availability::Unavailable(reason_for(&err).to_string()),
        }
    }
}

fn reason_for(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::AlreadySettled { .. } => "Loan is already settled",
        LedgerError::Unauthorized { .. } => "Not owner",
        LedgerError::LoanHasBids { .. } => "Cannot cancel with bids",
        LedgerError::NoCapacity { .. } => "No capacity to draw",
        LedgerError::NoActiveLender { .. } => "Loan has no bids",
        LedgerError::Expired { .. } => "Loan has expired",
        LedgerError::NotExpired { .. } => "Loan has not expired",
        LedgerError::ExceedsCeiling { .. } => "Bid too large",
        LedgerError::InsufficientBid { .. } => "Bid under top bid",
        LedgerError::Underfunded { .. } => "Insufficient repayment",
        LedgerError::ReentrantCall { .. } => "Loan is busy",
        _ => "Unavailable",
    }
}

/// the five loan actions and whether each is open to a given caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanActions {
    pub underwrite: Availability,
    pub draw: Availability,
    pub repay: Availability,
    pub cancel: Availability,
    pub seize: Availability,
}

impl LoanActions {
    pub fn from_checks(
        underwrite: Result<()>,
        draw: Result<()>,
        repay: Result<()>,
        cancel: Result<()>,
        seize: Result<()>,
    ) -> Self {
        LoanActions {
            underwrite: underwrite.into(),
            draw: draw.into(),
            repay: repay.into(),
            cancel: cancel.into(),
            seize: seize.into(),
        }
    }
}
