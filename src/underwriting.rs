use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{DisplacedLender, Event};
use crate::interest::AccrualEngine;
use crate::settlement::{ensure_open, Transition};
use crate::custody::TransferPlan;
use crate::state::Loan;
use crate::types::{Address, LoanId};

/// a bid as submitted: the principal offered and the value sent with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRequest {
    pub bidder: Address,
    pub bid_amount: Money,
    /// must cover `bid_amount` plus all interest owed to any lender being replaced
    pub deposit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidReceipt {
    pub loan_id: LoanId,
    pub lender: Address,
    pub loan_amount: Money,
    /// interest paid to the displaced lender, historic and accrued
    pub interest_paid: Money,
    pub displaced: Option<DisplacedLender>,
    /// unspent deposit returned to the bidder
    pub change: Money,
}

/// what a bidder should send to place `bid_amount`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidQuote {
    pub loan_id: LoanId,
    pub bid_amount: Money,
    /// total interest the current lender is bought out for at the quote horizon
    pub interest_due: Money,
    pub deposit: Money,
    pub valid_until: DateTime<Utc>,
}

/// accepts bids and displaces outbid lenders
#[derive(Debug, Clone, Copy)]
pub struct UnderwritingEngine {
    accrual: AccrualEngine,
}

impl UnderwritingEngine {
    pub fn new(accrual: AccrualEngine) -> Self {
        Self { accrual }
    }

    /// checks that depend only on the bid amount, not on the deposit
    pub fn validate_bid(
        &self,
        loan_id: LoanId,
        loan: &Loan,
        bid_amount: Money,
        now: DateTime<Utc>,
    ) -> Result<()> {
        ensure_open(loan_id, loan)?;
        if loan.is_expired(now) {
            return Err(LedgerError::Expired {
                deadline: loan.loan_complete_time,
                current_time: now,
            });
        }
        if bid_amount <= loan.loan_amount {
            return Err(LedgerError::InsufficientBid {
                required: loan.loan_amount + Money::ONE_WEI,
                provided: bid_amount,
            });
        }
        if bid_amount > loan.max_loan_amount {
            return Err(LedgerError::ExceedsCeiling {
                ceiling: loan.max_loan_amount,
                requested: bid_amount,
            });
        }
        Ok(())
    }

    /// deposit to send now so the bid still clears at `horizon`
    pub fn quote(
        &self,
        loan_id: LoanId,
        loan: &Loan,
        bid_amount: Money,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
    ) -> Result<BidQuote> {
        self.validate_bid(loan_id, loan, bid_amount, now)?;
        let interest_due = self.accrual.total_interest(loan, horizon)?;
        let deposit = self.accrual.outbid_cost(loan, bid_amount, horizon)?;
        Ok(BidQuote {
            loan_id,
            bid_amount,
            interest_due,
            deposit,
            valid_until: horizon,
        })
    }

    pub fn underwrite(
        &self,
        loan_id: LoanId,
        loan: &Loan,
        request: &BidRequest,
        now: DateTime<Utc>,
    ) -> Result<Transition<BidReceipt>> {
        self.validate_bid(loan_id, loan, request.bid_amount, now)?;

        let accrued = self.accrual.accrued_interest(loan, now)?;
        let interest = self.accrual.total_interest(loan, now)?;
        let required = self.accrual.outbid_cost(loan, request.bid_amount, now)?;
        if request.deposit < required {
            return Err(LedgerError::InsufficientBid {
                required,
                provided: request.deposit,
            });
        }
        let change = request.deposit - required;

        let mut plan = TransferPlan::new();
        plan.accept(request.bidder, request.deposit);

        let mut updated = loan.clone();
        let displaced = if loan.has_lender() {
            let refund = loan.loan_amount + interest;
            plan.pay(loan.lender, refund);
            updated.historic_interest += accrued;
            Some(DisplacedLender {
                lender: loan.lender,
                principal: loan.loan_amount,
                interest,
            })
        } else {
            updated.first_bid_time = Some(now);
            None
        };
        plan.pay(request.bidder, change);

        updated.lender = request.bidder;
        updated.loan_amount = request.bid_amount;
        updated.last_bid_time = Some(now);

        Ok(Transition {
            event: Event::LoanUnderwritten {
                loan_id,
                lender: request.bidder,
                loan_amount: request.bid_amount,
                displaced: displaced.clone(),
                timestamp: now,
            },
            receipt: BidReceipt {
                loan_id,
                lender: request.bidder,
                loan_amount: request.bid_amount,
                interest_paid: if displaced.is_some() { interest } else { Money::ZERO },
                displaced,
                change,
            },
            trigger: format!("underwrite: {}", request.bid_amount),
            loan: updated,
            plan,
        })
    }
}
