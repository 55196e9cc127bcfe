use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::custody::{Transfer, TransferPlan};
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::Event;
use crate::interest::AccrualEngine;
use crate::state::Loan;
use crate::types::{Address, LoanId, Settlement};

/// a validated state change waiting to be committed
///
/// `loan` is the record as it will read after commit; `plan` holds the
/// transfers that must all succeed for it to stand.
#[derive(Debug, Clone)]
pub struct Transition<R> {
    pub loan: Loan,
    pub plan: TransferPlan,
    pub event: Event,
    pub receipt: R,
    pub trigger: String,
}

/// refuse any further change to a retired record
pub fn ensure_open(loan_id: LoanId, loan: &Loan) -> Result<()> {
    if loan.is_settled() {
        return Err(LedgerError::AlreadySettled { loan_id });
    }
    Ok(())
}

pub fn ensure_borrower(loan_id: LoanId, loan: &Loan, caller: &Address) -> Result<()> {
    if loan.collateral_owner != *caller {
        return Err(LedgerError::Unauthorized {
            loan_id,
            caller: *caller,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawReceipt {
    pub loan_id: LoanId,
    pub amount: Money,
    pub total_drawn: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentReceipt {
    pub loan_id: LoanId,
    pub lender: Address,
    /// drawn principal plus all interest, taken from the payer
    pub required: Money,
    /// everything the lender received, escrowed principal included
    pub paid_to_lender: Money,
    pub interest: Money,
    pub change: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeizureReceipt {
    pub loan_id: LoanId,
    pub lender: Address,
    /// principal the lender gave up in exchange for the collateral
    pub principal: Money,
}

/// computes draw, repay, seize and cancel transitions
#[derive(Debug, Clone, Copy)]
pub struct SettlementEngine {
    accrual: AccrualEngine,
}

impl SettlementEngine {
    pub fn new(accrual: AccrualEngine) -> Self {
        Self { accrual }
    }

    /// release all undrawn principal to the borrower
    pub fn draw(
        &self,
        loan_id: LoanId,
        loan: &Loan,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<Transition<DrawReceipt>> {
        ensure_open(loan_id, loan)?;
        ensure_borrower(loan_id, loan, caller)?;

        let amount = loan.undrawn();
        if amount.is_zero() {
            return Err(LedgerError::NoCapacity { loan_id });
        }

        let mut updated = loan.clone();
        updated.loan_amount_drawn = loan.loan_amount;

        let mut plan = TransferPlan::new();
        plan.pay(loan.collateral_owner, amount);

        Ok(Transition {
            event: Event::LoanDrawn {
                loan_id,
                borrower: loan.collateral_owner,
                amount,
                total_drawn: updated.loan_amount_drawn,
                timestamp: now,
            },
            receipt: DrawReceipt {
                loan_id,
                amount,
                total_drawn: updated.loan_amount_drawn,
            },
            trigger: format!("draw: {}", amount),
            loan: updated,
            plan,
        })
    }

    /// discharge the loan and hand the collateral back to the borrower
    pub fn repay(
        &self,
        loan_id: LoanId,
        loan: &Loan,
        payer: &Address,
        deposit: Money,
        now: DateTime<Utc>,
    ) -> Result<Transition<RepaymentReceipt>> {
        ensure_open(loan_id, loan)?;
        if !loan.has_lender() {
            return Err(LedgerError::NoActiveLender { loan_id });
        }
        if loan.is_expired(now) {
            return Err(LedgerError::Expired {
                deadline: loan.loan_complete_time,
                current_time: now,
            });
        }

        let interest = self.accrual.total_interest(loan, now)?;
        let required = self.accrual.required_repayment(loan, now)?;
        if deposit < required {
            return Err(LedgerError::Underfunded {
                required,
                provided: deposit,
            });
        }

        let paid_to_lender = loan.undrawn() + required;
        let change = deposit - required;
        let borrower = loan.collateral_owner;

        let mut plan = TransferPlan::new();
        plan.accept(*payer, deposit);
        plan.pay(loan.lender, paid_to_lender);
        plan.push(Transfer::AssetOut {
            asset: loan.collateral_asset,
            id: loan.collateral_id,
            to: borrower,
        });
        plan.pay(*payer, change);

        let mut updated = loan.clone();
        updated.tombstone(Settlement::Repaid {
            borrower,
            payer: *payer,
            principal: loan.loan_amount,
            interest,
            timestamp: now,
        });

        Ok(Transition {
            event: Event::LoanRepaid {
                loan_id,
                payer: *payer,
                lender: loan.lender,
                principal: loan.loan_amount,
                interest,
                timestamp: now,
            },
            receipt: RepaymentReceipt {
                loan_id,
                lender: loan.lender,
                required,
                paid_to_lender,
                interest,
                change,
            },
            trigger: format!("repay: {}", required),
            loan: updated,
            plan,
        })
    }

    /// give the collateral to the lender of a defaulted loan
    pub fn seize(
        &self,
        loan_id: LoanId,
        loan: &Loan,
        now: DateTime<Utc>,
    ) -> Result<Transition<SeizureReceipt>> {
        ensure_open(loan_id, loan)?;
        if !loan.is_expired(now) {
            return Err(LedgerError::NotExpired {
                deadline: loan.loan_complete_time,
                current_time: now,
            });
        }
        if !loan.has_lender() {
            return Err(LedgerError::NoActiveLender { loan_id });
        }

        let mut plan = TransferPlan::new();
        plan.push(Transfer::AssetOut {
            asset: loan.collateral_asset,
            id: loan.collateral_id,
            to: loan.lender,
        });

        let mut updated = loan.clone();
        updated.tombstone(Settlement::Seized {
            borrower: loan.collateral_owner,
            lender: loan.lender,
            principal: loan.loan_amount,
            timestamp: now,
        });

        Ok(Transition {
            event: Event::CollateralSeized {
                loan_id,
                lender: loan.lender,
                collateral_asset: loan.collateral_asset,
                collateral_id: loan.collateral_id,
                timestamp: now,
            },
            receipt: SeizureReceipt {
                loan_id,
                lender: loan.lender,
                principal: loan.loan_amount,
            },
            trigger: "seize".to_string(),
            loan: updated,
            plan,
        })
    }

    /// withdraw a listing that never received a bid
    pub fn cancel(
        &self,
        loan_id: LoanId,
        loan: &Loan,
        caller: &Address,
        now: DateTime<Utc>,
    ) -> Result<Transition<()>> {
        ensure_open(loan_id, loan)?;
        ensure_borrower(loan_id, loan, caller)?;
        if loan.loan_amount.is_positive() || loan.has_lender() {
            return Err(LedgerError::LoanHasBids { loan_id });
        }

        let mut plan = TransferPlan::new();
        plan.push(Transfer::AssetOut {
            asset: loan.collateral_asset,
            id: loan.collateral_id,
            to: *caller,
        });

        let mut updated = loan.clone();
        updated.tombstone(Settlement::Cancelled {
            borrower: *caller,
            timestamp: now,
        });

        Ok(Transition {
            event: Event::LoanCancelled {
                loan_id,
                borrower: *caller,
                timestamp: now,
            },
            receipt: (),
            trigger: "cancel".to_string(),
            loan: updated,
            plan,
        })
    }
}
