use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{Address, CollateralId, LoanId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid loan terms: {message}")]
    InvalidTerms {
        message: String,
    },

    #[error("loan {loan_id} not found")]
    NotFound {
        loan_id: LoanId,
    },

    #[error("caller {caller} is not the borrower of loan {loan_id}")]
    Unauthorized {
        loan_id: LoanId,
        caller: Address,
    },

    #[error("loan {loan_id} already has bids")]
    LoanHasBids {
        loan_id: LoanId,
    },

    #[error("bid exceeds ceiling: ceiling {ceiling}, requested {requested}")]
    ExceedsCeiling {
        ceiling: Money,
        requested: Money,
    },

    #[error("insufficient bid: required {required}, provided {provided}")]
    InsufficientBid {
        required: Money,
        provided: Money,
    },

    #[error("repayment underfunded: required {required}, provided {provided}")]
    Underfunded {
        required: Money,
        provided: Money,
    },

    #[error("loan {loan_id} has no undrawn capital")]
    NoCapacity {
        loan_id: LoanId,
    },

    #[error("loan {loan_id} has no lender")]
    NoActiveLender {
        loan_id: LoanId,
    },

    #[error("loan expired at {deadline}, current time {current_time}")]
    Expired {
        deadline: DateTime<Utc>,
        current_time: DateTime<Utc>,
    },

    #[error("loan not expired: deadline {deadline}, current time {current_time}")]
    NotExpired {
        deadline: DateTime<Utc>,
        current_time: DateTime<Utc>,
    },

    #[error("loan {loan_id} already settled")]
    AlreadySettled {
        loan_id: LoanId,
    },

    #[error("collateral {asset}#{collateral_id} unavailable: {reason}")]
    CollateralUnavailable {
        asset: Address,
        collateral_id: CollateralId,
        reason: String,
    },

    #[error("transfer failed: {reason}")]
    TransferFailed {
        reason: String,
    },

    #[error("reentrant call on loan {loan_id}")]
    ReentrantCall {
        loan_id: LoanId,
    },

    #[error("calculation error: {message}")]
    CalculationError {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;
