use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{Address, CollateralId, LoanId, LoanStatus, Settlement};

/// one collateral deposit and its funding lifecycle
///
/// Field order is the order of the public read contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub collateral_asset: Address,
    /// borrower; `Address::ZERO` once the loan is settled
    pub collateral_owner: Address,
    /// top bidder; `Address::ZERO` until the first bid
    pub lender: Address,
    pub collateral_id: CollateralId,
    pub interest_rate: Rate,
    pub loan_amount: Money,
    pub max_loan_amount: Money,
    pub loan_amount_drawn: Money,
    pub first_bid_time: Option<DateTime<Utc>>,
    pub last_bid_time: Option<DateTime<Utc>>,
    pub historic_interest: Money,
    pub loan_complete_time: DateTime<Utc>,
    pub settlement: Option<Settlement>,
}

impl Loan {
    /// new listing with no bids
    pub fn new(
        owner: Address,
        collateral_asset: Address,
        collateral_id: CollateralId,
        interest_rate: Rate,
        max_loan_amount: Money,
        loan_complete_time: DateTime<Utc>,
    ) -> Self {
        Self {
            collateral_asset,
            collateral_owner: owner,
            lender: Address::ZERO,
            collateral_id,
            interest_rate,
            loan_amount: Money::ZERO,
            max_loan_amount,
            loan_amount_drawn: Money::ZERO,
            first_bid_time: None,
            last_bid_time: None,
            historic_interest: Money::ZERO,
            loan_complete_time,
            settlement: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.collateral_owner.is_zero()
    }

    pub fn has_lender(&self) -> bool {
        self.first_bid_time.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.loan_complete_time
    }

    /// principal accepted from the lender but not yet released
    pub fn undrawn(&self) -> Money {
        self.loan_amount.saturating_sub(self.loan_amount_drawn)
    }

    /// room left under the bid ceiling
    pub fn capacity(&self) -> Money {
        self.max_loan_amount.saturating_sub(self.loan_amount)
    }

    /// the borrower, also for settled records
    pub fn borrower(&self) -> Address {
        match &self.settlement {
            Some(settlement) => settlement.borrower(),
            None => self.collateral_owner,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> LoanStatus {
        if let Some(settlement) = &self.settlement {
            return settlement.status();
        }
        match (self.has_lender(), self.is_expired(now)) {
            (false, false) => LoanStatus::Listed,
            (false, true) => LoanStatus::Lapsed,
            (true, false) => LoanStatus::Underwritten,
            (true, true) => LoanStatus::Defaulted,
        }
    }

    /// retire the record
    pub(crate) fn tombstone(&mut self, settlement: Settlement) {
        self.collateral_owner = Address::ZERO;
        self.loan_amount = Money::ZERO;
        self.loan_amount_drawn = Money::ZERO;
        self.settlement = Some(settlement);
    }

    /// first invariant the record breaks, if any
    pub fn invariant_violation(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if self.loan_amount_drawn > self.loan_amount {
            return Some("drawn exceeds loan amount");
        }
        if self.loan_amount > self.max_loan_amount {
            return Some("loan amount exceeds ceiling");
        }
        if self.loan_amount_drawn.is_negative() || self.historic_interest.is_negative() {
            return Some("negative balance");
        }
        match (self.first_bid_time, self.last_bid_time) {
            (None, None) => {
                if !self.lender.is_zero() {
                    return Some("lender set without a bid");
                }
                if !self.loan_amount.is_zero() {
                    return Some("loan amount without a bid");
                }
            }
            (Some(first), Some(last)) => {
                if first > last || last > now {
                    return Some("bid times out of order");
                }
                if self.lender.is_zero() {
                    return Some("bid without a lender");
                }
            }
            _ => return Some("bid times partially set"),
        }
        if self.is_settled() != self.settlement.is_some() {
            return Some("tombstone and settlement disagree");
        }
        None
    }
}

/// state snapshot for audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub snapshot_id: Uuid,
    pub loan_id: LoanId,
    pub timestamp: DateTime<Utc>,
    pub state: Loan,
    pub trigger: String,
}

impl StateSnapshot {
    pub fn capture(loan_id: LoanId, state: &Loan, timestamp: DateTime<Utc>, trigger: String) -> Self {
        Self {
            snapshot_id: Uuid::new_v4(),
            loan_id,
            timestamp,
            state: state.clone(),
            trigger,
        }
    }
}
