use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::custody::{Custody, Transfer, TransferPlan};
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::guard::ReentrancyGuard;
use crate::interest::AccrualEngine;
use crate::settlement::{DrawReceipt, RepaymentReceipt, SeizureReceipt, SettlementEngine, Transition};
use crate::state::{Loan, StateSnapshot};
use crate::types::{Address, CollateralId, LoanId, LoanStatus};
use crate::underwriting::{BidQuote, BidReceipt, BidRequest, UnderwritingEngine};
use crate::view::LoanActions;

/// borrower-chosen terms for a new loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub collateral_asset: Address,
    pub collateral_id: CollateralId,
    pub interest_rate: Rate,
    pub max_loan_amount: Money,
    pub loan_complete_time: DateTime<Utc>,
}

impl LoanTerms {
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.loan_complete_time <= now {
            return Err(LedgerError::InvalidTerms {
                message: format!(
                    "completion time {} is not after {}",
                    self.loan_complete_time, now
                ),
            });
        }
        if !self.max_loan_amount.is_positive() {
            return Err(LedgerError::InvalidTerms {
                message: "bid ceiling must be positive".to_string(),
            });
        }
        if self.interest_rate.is_negative() {
            return Err(LedgerError::InvalidTerms {
                message: format!("negative interest rate {}", self.interest_rate),
            });
        }
        if self.collateral_asset.is_zero() {
            return Err(LedgerError::InvalidTerms {
                message: "collateral asset cannot be the zero address".to_string(),
            });
        }
        Ok(())
    }
}

/// append-only book of loans and the rails they settle through
pub struct LoanLedger<C: Custody> {
    config: LedgerConfig,
    loans: Vec<Loan>,
    custody: C,
    guard: ReentrancyGuard,
    accrual: AccrualEngine,
    underwriting: UnderwritingEngine,
    settlement: SettlementEngine,
    pub events: EventStore,
    pub snapshots: Vec<StateSnapshot>,
}

impl<C: Custody> LoanLedger<C> {
    pub fn new(config: LedgerConfig, custody: C) -> Result<Self> {
        config.validate()?;
        let accrual = AccrualEngine::new(config.seconds_per_year);

        Ok(Self {
            config,
            loans: Vec::new(),
            custody,
            guard: ReentrancyGuard::new(),
            accrual,
            underwriting: UnderwritingEngine::new(accrual),
            settlement: SettlementEngine::new(accrual),
            events: EventStore::new(),
            snapshots: Vec::new(),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    /// direct access to the rails, for funding accounts outside the ledger
    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    // ---- reads ----

    pub fn num_loans(&self) -> u64 {
        self.loans.len() as u64
    }

    pub fn get_loan(&self, loan_id: LoanId) -> Result<&Loan> {
        usize::try_from(loan_id)
            .ok()
            .and_then(|index| self.loans.get(index))
            .ok_or(LedgerError::NotFound { loan_id })
    }

    /// every record in creation order, tombstones included
    pub fn loans(&self) -> impl Iterator<Item = (LoanId, &Loan)> {
        self.loans.iter().enumerate().map(|(i, loan)| (i as LoanId, loan))
    }

    pub fn status(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<LoanStatus> {
        Ok(self.get_loan(loan_id)?.status(time.now()))
    }

    pub fn calculate_total_interest(&self, loan_id: LoanId, at: DateTime<Utc>) -> Result<Money> {
        self.accrual.total_interest(self.get_loan(loan_id)?, at)
    }

    pub fn calculate_required_repayment(&self, loan_id: LoanId, at: DateTime<Utc>) -> Result<Money> {
        self.accrual.required_repayment(self.get_loan(loan_id)?, at)
    }

    /// total interest projected to the end of the settlement buffer
    pub fn quote_total_interest(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<Money> {
        self.calculate_total_interest(loan_id, self.horizon(time))
    }

    /// repayment to send now so it still clears when the call lands
    pub fn quote_required_repayment(&self, loan_id: LoanId, time: &SafeTimeProvider) -> Result<Money> {
        let amount = self.calculate_required_repayment(loan_id, self.horizon(time))?;
        debug!(loan_id, %amount, "quoted repayment");
        Ok(amount)
    }

    /// deposit to send with a bid of `bid_amount`
    pub fn quote_underwrite(
        &self,
        loan_id: LoanId,
        bid_amount: Money,
        time: &SafeTimeProvider,
    ) -> Result<BidQuote> {
        let loan = self.get_loan(loan_id)?;
        let quote = self
            .underwriting
            .quote(loan_id, loan, bid_amount, time.now(), self.horizon(time))?;
        debug!(loan_id, bid = %bid_amount, deposit = %quote.deposit, "quoted bid");
        Ok(quote)
    }

    /// which actions `caller` could take on the loan right now
    pub fn available_actions(
        &self,
        loan_id: LoanId,
        caller: &Address,
        time: &SafeTimeProvider,
    ) -> Result<LoanActions> {
        let loan = self.get_loan(loan_id)?;
        let now = time.now();

        let underwrite = self
            .underwriting
            .validate_bid(loan_id, loan, loan.loan_amount + Money::ONE_WEI, now);
        let draw = self.settlement.draw(loan_id, loan, caller, now).map(|_| ());
        let repay = self
            .accrual
            .required_repayment(loan, now)
            .and_then(|required| self.settlement.repay(loan_id, loan, caller, required, now))
            .map(|_| ());
        let cancel = self.settlement.cancel(loan_id, loan, caller, now).map(|_| ());
        let seize = self.settlement.seize(loan_id, loan, now).map(|_| ());

        Ok(LoanActions::from_checks(underwrite, draw, repay, cancel, seize))
    }

    fn horizon(&self, time: &SafeTimeProvider) -> DateTime<Utc> {
        time.now() + self.config.settlement_buffer()
    }

    // ---- actions ----

    /// escrow `owner`'s collateral and list it for bids
    pub fn create_loan(
        &mut self,
        owner: Address,
        terms: LoanTerms,
        time: &SafeTimeProvider,
    ) -> Result<LoanId> {
        let now = time.now();
        let loan_id = self.num_loans();
        self.guarded(loan_id, |ledger| ledger.create_inner(loan_id, owner, terms, now))
    }

    fn create_inner(
        &mut self,
        loan_id: LoanId,
        owner: Address,
        terms: LoanTerms,
        now: DateTime<Utc>,
    ) -> Result<LoanId> {
        terms.validate(now)?;
        if owner.is_zero() {
            return Err(LedgerError::InvalidTerms {
                message: "borrower cannot be the zero address".to_string(),
            });
        }

        self.loans.push(Loan::new(
            owner,
            terms.collateral_asset,
            terms.collateral_id,
            terms.interest_rate,
            terms.max_loan_amount,
            terms.loan_complete_time,
        ));

        let mut plan = TransferPlan::new();
        plan.push(Transfer::AssetIn {
            asset: terms.collateral_asset,
            id: terms.collateral_id,
            from: owner,
        });
        if let Err(err) = plan.execute(&mut self.custody) {
            self.loans.pop();
            warn!(loan_id, error = %err, "collateral transfer failed, listing reverted");
            return Err(LedgerError::CollateralUnavailable {
                asset: terms.collateral_asset,
                collateral_id: terms.collateral_id,
                reason: err.to_string(),
            });
        }

        self.debug_check(loan_id, now);
        self.record(loan_id, now, "origination".to_string());
        self.events.emit(Event::LoanCreated {
            loan_id,
            borrower: owner,
            collateral_asset: terms.collateral_asset,
            collateral_id: terms.collateral_id,
            interest_rate: terms.interest_rate,
            max_loan_amount: terms.max_loan_amount,
            loan_complete_time: terms.loan_complete_time,
        });
        info!(
            loan_id,
            borrower = %owner,
            asset = %terms.collateral_asset,
            collateral_id = terms.collateral_id,
            ceiling = %terms.max_loan_amount,
            "loan created"
        );

        Ok(loan_id)
    }

    /// return the collateral of an unbid listing to its owner
    pub fn cancel_loan(
        &mut self,
        loan_id: LoanId,
        caller: &Address,
        time: &SafeTimeProvider,
    ) -> Result<()> {
        let now = time.now();
        self.guarded(loan_id, |ledger| {
            let transition = ledger.settlement.cancel(loan_id, ledger.get_loan(loan_id)?, caller, now)?;
            ledger.commit(loan_id, transition, now)
        })
    }

    /// place a new top bid, displacing the current lender if any
    pub fn underwrite(
        &mut self,
        loan_id: LoanId,
        request: BidRequest,
        time: &SafeTimeProvider,
    ) -> Result<BidReceipt> {
        let now = time.now();
        self.guarded(loan_id, |ledger| {
            let transition =
                ledger.underwriting.underwrite(loan_id, ledger.get_loan(loan_id)?, &request, now)?;
            ledger.commit(loan_id, transition, now)
        })
    }

    /// release undrawn principal to the borrower
    pub fn draw_loan(
        &mut self,
        loan_id: LoanId,
        caller: &Address,
        time: &SafeTimeProvider,
    ) -> Result<DrawReceipt> {
        let now = time.now();
        self.guarded(loan_id, |ledger| {
            let transition = ledger.settlement.draw(loan_id, ledger.get_loan(loan_id)?, caller, now)?;
            ledger.commit(loan_id, transition, now)
        })
    }

    /// pay off the loan; any caller may repay on the borrower's behalf
    pub fn repay_loan(
        &mut self,
        loan_id: LoanId,
        payer: &Address,
        deposit: Money,
        time: &SafeTimeProvider,
    ) -> Result<RepaymentReceipt> {
        let now = time.now();
        self.guarded(loan_id, |ledger| {
            let transition =
                ledger.settlement.repay(loan_id, ledger.get_loan(loan_id)?, payer, deposit, now)?;
            ledger.commit(loan_id, transition, now)
        })
    }

    /// hand a defaulted loan's collateral to its lender; anyone may trigger it
    pub fn seize_collateral(
        &mut self,
        loan_id: LoanId,
        caller: &Address,
        time: &SafeTimeProvider,
    ) -> Result<SeizureReceipt> {
        let now = time.now();
        debug!(loan_id, caller = %caller, "seize requested");
        self.guarded(loan_id, |ledger| {
            let transition = ledger.settlement.seize(loan_id, ledger.get_loan(loan_id)?, now)?;
            ledger.commit(loan_id, transition, now)
        })
    }

    // ---- internals ----

    fn guarded<R>(
        &mut self,
        loan_id: LoanId,
        op: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.guard.enter(loan_id)?;
        let result = op(self);
        self.guard.exit(loan_id);
        result
    }

    /// write the new record, then settle; restore the record if settlement fails
    fn commit<R>(&mut self, loan_id: LoanId, transition: Transition<R>, now: DateTime<Utc>) -> Result<R> {
        let Transition {
            loan,
            plan,
            event,
            receipt,
            trigger,
        } = transition;

        let slot = usize::try_from(loan_id)
            .ok()
            .and_then(|index| self.loans.get_mut(index))
            .ok_or(LedgerError::NotFound { loan_id })?;
        let previous = std::mem::replace(slot, loan);

        if let Err(err) = plan.execute(&mut self.custody) {
            if let Some(slot) = self.loans.get_mut(loan_id as usize) {
                *slot = previous;
            }
            warn!(loan_id, %trigger, error = %err, "settlement failed, loan reverted");
            return Err(err);
        }

        self.debug_check(loan_id, now);
        self.record(loan_id, now, trigger.clone());
        self.events.emit(event);
        info!(loan_id, %trigger, "loan updated");

        Ok(receipt)
    }

    fn record(&mut self, loan_id: LoanId, now: DateTime<Utc>, trigger: String) {
        if let Ok(loan) = self.get_loan(loan_id) {
            let snapshot = StateSnapshot::capture(loan_id, loan, now, trigger);
            self.snapshots.push(snapshot);
        }
    }

    fn debug_check(&self, loan_id: LoanId, now: DateTime<Utc>) {
        if let Ok(loan) = self.get_loan(loan_id) {
            debug_assert_eq!(
                loan.invariant_violation(now),
                None,
                "loan {} broke an invariant",
                loan_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::InMemoryCustody;
    use crate::types::Settlement;
    use chrono::{Duration, TimeZone};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    const ESCROW: Address = Address::repeat_byte(0xee);
    const BORROWER: Address = Address::repeat_byte(0xb1);
    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);
    const CAROL: Address = Address::repeat_byte(0xc0);
    const NFT: Address = Address::repeat_byte(0x77);

    fn setup() -> (LoanLedger<InMemoryCustody>, SafeTimeProvider) {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let mut custody = InMemoryCustody::new(ESCROW);
        custody.mint_asset(NFT, 1, BORROWER);
        custody.mint_asset(NFT, 2, BORROWER);
        for lender in [ALICE, BOB, CAROL, BORROWER] {
            custody.fund(lender, Money::from_major(10));
        }
        let config = LedgerConfig::default().with_ledger_address(ESCROW);
        (LoanLedger::new(config, custody).unwrap(), time)
    }

    fn terms(id: CollateralId, time: &SafeTimeProvider) -> LoanTerms {
        LoanTerms {
            collateral_asset: NFT,
            collateral_id: id,
            interest_rate: Rate::from_percentage(5),
            max_loan_amount: Money::from_major(3),
            loan_complete_time: time.now() + Duration::days(7),
        }
    }

    fn bid(bidder: Address, amount: Money, deposit: Money) -> BidRequest {
        BidRequest {
            bidder,
            bid_amount: amount,
            deposit,
        }
    }

    #[test]
    fn test_create_escrows_collateral_and_assigns_ids() {
        let (mut ledger, time) = setup();

        let first = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        let second = ledger.create_loan(BORROWER, terms(2, &time), &time).unwrap();

        assert_eq!((first, second), (0, 1));
        assert_eq!(ledger.num_loans(), 2);
        assert!(ledger.custody().is_escrowed(&NFT, 1));
        assert!(matches!(
            ledger.events.events()[0],
            Event::LoanCreated { loan_id: 0, .. }
        ));
        assert_eq!(ledger.get_loan(5).unwrap_err(), LedgerError::NotFound { loan_id: 5 });
    }

    #[test]
    fn test_create_rejects_bad_terms_and_missing_collateral() {
        let (mut ledger, time) = setup();

        let mut past = terms(1, &time);
        past.loan_complete_time = time.now();
        assert!(matches!(
            ledger.create_loan(BORROWER, past, &time),
            Err(LedgerError::InvalidTerms { .. })
        ));

        let mut zero_ceiling = terms(1, &time);
        zero_ceiling.max_loan_amount = Money::ZERO;
        assert!(matches!(
            ledger.create_loan(BORROWER, zero_ceiling, &time),
            Err(LedgerError::InvalidTerms { .. })
        ));

        // not the owner of the token
        assert!(matches!(
            ledger.create_loan(ALICE, terms(1, &time), &time),
            Err(LedgerError::CollateralUnavailable { .. })
        ));
        // token never minted
        assert!(matches!(
            ledger.create_loan(BORROWER, terms(99, &time), &time),
            Err(LedgerError::CollateralUnavailable { .. })
        ));
        assert_eq!(ledger.num_loans(), 0);
        assert!(ledger.events.events().is_empty());
    }

    // create, bid 1 ETH, then an equal bid is refused
    #[test]
    fn test_first_bid_and_equal_bid() {
        let (mut ledger, time) = setup();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();
        let loan = ledger.get_loan(id).unwrap();
        assert_eq!(loan.first_bid_time, Some(time.now()));
        assert_eq!(loan.last_bid_time, Some(time.now()));
        assert_eq!(loan.lender, ALICE);

        let equal = ledger.underwrite(id, bid(BOB, Money::ONE_ETHER, Money::from_major(2)), &time);
        assert!(matches!(equal, Err(LedgerError::InsufficientBid { .. })));
    }

    // a larger bid refunds the first lender with interest
    #[test]
    fn test_outbid_refunds_with_interest() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();
        let alice_after_bid = ledger.custody().balance_of(&ALICE);

        control.advance(Duration::days(2));
        let quote = ledger.quote_underwrite(id, Money::from_major(2), &time).unwrap();
        let receipt = ledger
            .underwrite(id, bid(BOB, Money::from_major(2), quote.deposit), &time)
            .unwrap();

        let interest = receipt.interest_paid;
        let expected = AccrualEngine::default()
            .calculate_simple_interest(Money::ONE_ETHER, Rate::from_percentage(5), 2 * 86_400)
            .unwrap();
        assert_eq!(interest, expected);
        assert_eq!(
            ledger.custody().balance_of(&ALICE),
            alice_after_bid + Money::ONE_ETHER + interest
        );

        let loan = ledger.get_loan(id).unwrap();
        assert_eq!(loan.historic_interest, interest);
        assert_eq!(loan.lender, BOB);
        assert_eq!(loan.loan_amount, Money::from_major(2));
        // bob paid bid plus interest, buffer returned as change
        assert_eq!(
            ledger.custody().balance_of(&BOB),
            Money::from_major(10) - Money::from_major(2) - interest
        );
    }

    // cancelling after a bid is refused
    #[test]
    fn test_cancel_after_bid_fails() {
        let (mut ledger, time) = setup();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();

        assert_eq!(
            ledger.cancel_loan(id, &BORROWER, &time).unwrap_err(),
            LedgerError::LoanHasBids { loan_id: id }
        );
    }

    #[test]
    fn test_cancel_returns_collateral() {
        let (mut ledger, time) = setup();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        assert!(matches!(
            ledger.cancel_loan(id, &ALICE, &time),
            Err(LedgerError::Unauthorized { .. })
        ));
        ledger.cancel_loan(id, &BORROWER, &time).unwrap();

        assert_eq!(ledger.custody().owner_of(&NFT, 1), Some(BORROWER));
        assert_eq!(ledger.status(id, &time).unwrap(), LoanStatus::Cancelled);
        assert_eq!(
            ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap_err(),
            LedgerError::AlreadySettled { loan_id: id }
        );
    }

    // default: repay refused, seize hands the collateral to the lender
    #[test]
    fn test_default_then_seize() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();

        assert!(matches!(
            ledger.seize_collateral(id, &CAROL, &time),
            Err(LedgerError::NotExpired { .. })
        ));

        control.advance(Duration::days(7));
        assert_eq!(ledger.status(id, &time).unwrap(), LoanStatus::Defaulted);
        assert!(matches!(
            ledger.repay_loan(id, &BORROWER, Money::from_major(5), &time),
            Err(LedgerError::Expired { .. })
        ));

        let held_before = ledger.custody().held_value();
        let receipt = ledger.seize_collateral(id, &CAROL, &time).unwrap();
        assert_eq!(receipt.lender, ALICE);
        assert_eq!(ledger.custody().owner_of(&NFT, 1), Some(ALICE));
        assert_eq!(ledger.custody().held_value(), held_before);
        assert!(matches!(
            ledger.get_loan(id).unwrap().settlement,
            Some(Settlement::Seized { lender: ALICE, .. })
        ));
    }

    // exact repayment discharges the loan and retires the record
    #[test]
    fn test_exact_repayment_settles() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::from_major(2), Money::from_major(2)), &time).unwrap();
        ledger.draw_loan(id, &BORROWER, &time).unwrap();

        control.advance(Duration::days(3));
        let required = ledger.calculate_required_repayment(id, time.now()).unwrap();
        let interest = ledger.calculate_total_interest(id, time.now()).unwrap();
        let receipt = ledger.repay_loan(id, &BORROWER, required, &time).unwrap();

        assert_eq!(receipt.required, required);
        assert_eq!(receipt.change, Money::ZERO);
        assert_eq!(
            ledger.custody().balance_of(&ALICE),
            Money::from_major(10) + interest
        );
        assert_eq!(ledger.custody().owner_of(&NFT, 1), Some(BORROWER));
        assert_eq!(ledger.custody().held_value(), Money::ZERO);

        let loan = ledger.get_loan(id).unwrap();
        assert!(loan.is_settled());
        assert_eq!(loan.status(time.now()), LoanStatus::Repaid);

        let settled = LedgerError::AlreadySettled { loan_id: id };
        assert_eq!(ledger.repay_loan(id, &BORROWER, required, &time).unwrap_err(), settled);
        assert_eq!(ledger.draw_loan(id, &BORROWER, &time).unwrap_err(), settled);
        assert_eq!(ledger.cancel_loan(id, &BORROWER, &time).unwrap_err(), settled);
        assert_eq!(ledger.seize_collateral(id, &CAROL, &time).unwrap_err(), settled);
        assert_eq!(
            ledger
                .underwrite(id, bid(BOB, Money::from_major(3), Money::from_major(3)), &time)
                .unwrap_err(),
            settled
        );
    }

    #[test]
    fn test_underfunded_repayment() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();
        ledger.draw_loan(id, &BORROWER, &time).unwrap();

        control.advance(Duration::hours(10));
        let required = ledger.calculate_required_repayment(id, time.now()).unwrap();
        assert_eq!(
            ledger
                .repay_loan(id, &BORROWER, required - Money::ONE_WEI, &time)
                .unwrap_err(),
            LedgerError::Underfunded {
                required,
                provided: required - Money::ONE_WEI,
            }
        );
    }

    #[test]
    fn test_draws_follow_new_capacity() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        assert_eq!(
            ledger.draw_loan(id, &BORROWER, &time).unwrap_err(),
            LedgerError::NoCapacity { loan_id: id }
        );

        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();
        assert_eq!(ledger.draw_loan(id, &BORROWER, &time).unwrap().amount, Money::ONE_ETHER);
        assert!(matches!(
            ledger.draw_loan(id, &BORROWER, &time),
            Err(LedgerError::NoCapacity { .. })
        ));

        control.advance(Duration::hours(1));
        let quote = ledger.quote_underwrite(id, Money::from_major(3), &time).unwrap();
        ledger.underwrite(id, bid(BOB, Money::from_major(3), quote.deposit), &time).unwrap();

        let receipt = ledger.draw_loan(id, &BORROWER, &time).unwrap();
        assert_eq!(receipt.amount, Money::from_major(2));
        assert_eq!(receipt.total_drawn, Money::from_major(3));
        assert_eq!(
            ledger.custody().balance_of(&BORROWER),
            Money::from_major(13)
        );
    }

    #[test]
    fn test_failed_refund_rolls_back_everything() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();

        control.advance(Duration::days(1));
        ledger.custody_mut().reject_transfers_to(ALICE);
        let before = ledger.get_loan(id).unwrap().clone();
        let events_before = ledger.events.events().len();
        let bob_before = ledger.custody().balance_of(&BOB);

        let quote = ledger.quote_underwrite(id, Money::from_major(2), &time).unwrap();
        let result = ledger.underwrite(id, bid(BOB, Money::from_major(2), quote.deposit), &time);

        assert!(matches!(result, Err(LedgerError::TransferFailed { .. })));
        assert_eq!(ledger.get_loan(id).unwrap(), &before);
        assert_eq!(ledger.custody().balance_of(&BOB), bob_before);
        assert_eq!(ledger.events.events().len(), events_before);
    }

    #[test]
    fn test_failed_collateral_return_rolls_back_repayment() {
        let (mut ledger, time) = setup();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();

        ledger.custody_mut().reject_transfers_to(BORROWER);
        let before = ledger.get_loan(id).unwrap().clone();
        let required = ledger.calculate_required_repayment(id, time.now()).unwrap();

        assert!(ledger.repay_loan(id, &CAROL, required, &time).is_err());
        assert_eq!(ledger.get_loan(id).unwrap(), &before);
        assert_eq!(ledger.custody().balance_of(&CAROL), Money::from_major(10));
        assert_eq!(ledger.custody().balance_of(&ALICE), Money::from_major(9));
        assert!(ledger.custody().is_escrowed(&NFT, 1));
    }

    #[test]
    fn test_reentrant_call_is_refused() {
        let (mut ledger, time) = setup();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        ledger.guard.enter(id).unwrap();
        assert_eq!(
            ledger
                .underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time)
                .unwrap_err(),
            LedgerError::ReentrantCall { loan_id: id }
        );
        assert_eq!(
            ledger.cancel_loan(id, &BORROWER, &time).unwrap_err(),
            LedgerError::ReentrantCall { loan_id: id }
        );
        // the refused call must not release the outer hold
        assert!(ledger.guard.is_held(id));

        ledger.guard.exit(id);
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();
        assert!(!ledger.guard.is_held(id));
    }

    #[test]
    fn test_invariants_hold_across_outbid_sequence() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        let bids = [
            (ALICE, "0.5"),
            (BOB, "0.75"),
            (CAROL, "1"),
            (ALICE, "1.25"),
            (BOB, "2"),
            (CAROL, "3"),
        ];
        let mut last_amount = Money::ZERO;
        let mut last_historic = Money::ZERO;

        for (step, (bidder, amount)) in bids.iter().enumerate() {
            control.advance(Duration::hours(7));
            let amount = Money::from_ether(amount).unwrap();
            let quote = ledger.quote_underwrite(id, amount, &time).unwrap();
            ledger.underwrite(id, bid(*bidder, amount, quote.deposit), &time).unwrap();
            if step % 2 == 0 {
                ledger.draw_loan(id, &BORROWER, &time).unwrap();
            }

            let loan = ledger.get_loan(id).unwrap();
            assert_eq!(loan.invariant_violation(time.now()), None);
            assert_eq!(loan.lender, *bidder);
            assert!(loan.loan_amount > last_amount);
            assert!(loan.historic_interest >= last_historic);
            last_amount = loan.loan_amount;
            last_historic = loan.historic_interest;

            // escrow holds exactly the undrawn principal
            assert_eq!(ledger.custody().held_value(), loan.undrawn());
        }

        // at the ceiling nothing more can be bid
        assert!(matches!(
            ledger.quote_underwrite(id, Money::from_major(3) + Money::ONE_WEI, &time),
            Err(LedgerError::ExceedsCeiling { .. })
        ));
    }

    #[test]
    fn test_quotes_are_pure_reads() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();
        control.advance(Duration::days(1));

        let at = time.now();
        let first = ledger.calculate_total_interest(id, at).unwrap();
        let second = ledger.calculate_total_interest(id, at).unwrap();
        assert_eq!(first, second);

        let buffered = ledger.quote_total_interest(id, &time).unwrap();
        assert!(buffered > first);
        assert_eq!(
            buffered,
            ledger.calculate_total_interest(id, at + Duration::seconds(120)).unwrap()
        );
        assert_eq!(ledger.snapshots.len(), 2);
    }

    #[test]
    fn test_available_actions_track_lifecycle() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        let listed = ledger.available_actions(id, &BORROWER, &time).unwrap();
        assert!(listed.underwrite.is_available());
        assert!(listed.cancel.is_available());
        assert!(!listed.draw.is_available());
        assert!(!listed.repay.is_available());
        assert!(!listed.seize.is_available());

        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();
        let stranger = ledger.available_actions(id, &CAROL, &time).unwrap();
        assert!(!stranger.draw.is_available());
        assert!(stranger.repay.is_available());
        assert!(!stranger.cancel.is_available());

        control.advance(Duration::days(8));
        let expired = ledger.available_actions(id, &CAROL, &time).unwrap();
        assert!(expired.seize.is_available());
        assert!(!expired.underwrite.is_available());
        assert!(!expired.repay.is_available());
    }

    #[test]
    fn test_large_loan_repays_after_a_month() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        ledger.custody_mut().fund(ALICE, Money::from_major(100));

        let mut large = terms(1, &time);
        large.max_loan_amount = Money::from_major(100);
        large.interest_rate = Rate::from_decimal(dec!(0.07255));
        large.loan_complete_time = time.now() + Duration::days(60);
        let id = ledger.create_loan(BORROWER, large, &time).unwrap();
        ledger
            .underwrite(id, bid(ALICE, Money::from_major(100), Money::from_major(100)), &time)
            .unwrap();
        ledger.draw_loan(id, &BORROWER, &time).unwrap();

        control.advance(Duration::days(29));
        let interest = Money::from_wei(576_424_657_534_246_575);
        let required = ledger.calculate_required_repayment(id, time.now()).unwrap();
        assert_eq!(required, Money::from_major(100) + interest);
        assert!(ledger.quote_required_repayment(id, &time).unwrap() > required);

        ledger.repay_loan(id, &BORROWER, required, &time).unwrap();
        assert_eq!(
            ledger.custody().balance_of(&ALICE),
            Money::from_major(110) + interest
        );
    }

    #[test]
    fn test_displaced_lenders_keep_their_interest() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let starting = Money::from_major(10);
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();

        control.advance(Duration::days(6));
        let amount = Money::from_ether("1.5").unwrap();
        let quote = ledger.quote_underwrite(id, amount, &time).unwrap();
        ledger.underwrite(id, bid(BOB, amount, quote.deposit), &time).unwrap();

        control.advance(Duration::hours(1));
        let quote = ledger.quote_underwrite(id, Money::from_major(2), &time).unwrap();
        ledger.underwrite(id, bid(CAROL, Money::from_major(2), quote.deposit), &time).unwrap();

        // repaid the moment the last lender arrives
        let required = ledger.calculate_required_repayment(id, time.now()).unwrap();
        ledger.repay_loan(id, &BORROWER, required, &time).unwrap();

        let alice = ledger.custody().balance_of(&ALICE);
        let bob = ledger.custody().balance_of(&BOB);
        let carol = ledger.custody().balance_of(&CAROL);
        assert!(alice > starting);
        assert!(bob > starting);
        assert_eq!(carol, starting);

        // every wei of lender profit came from the borrower
        let borrower_paid = starting - ledger.custody().balance_of(&BORROWER);
        assert_eq!(borrower_paid, required);
        assert_eq!((alice - starting) + (bob - starting), required);
        assert_eq!(ledger.custody().held_value(), Money::ZERO);
    }

    #[test]
    fn test_failed_draw_rolls_back() {
        let (mut ledger, time) = setup();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();

        ledger.custody_mut().reject_transfers_to(BORROWER);
        let before = ledger.get_loan(id).unwrap().clone();
        let events_before = ledger.events.events().len();

        assert!(matches!(
            ledger.draw_loan(id, &BORROWER, &time),
            Err(LedgerError::TransferFailed { .. })
        ));
        assert_eq!(ledger.get_loan(id).unwrap(), &before);
        assert_eq!(ledger.custody().held_value(), Money::ONE_ETHER);
        assert_eq!(ledger.custody().balance_of(&BORROWER), Money::from_major(10));
        assert_eq!(ledger.events.events().len(), events_before);
    }

    #[test]
    fn test_failed_cancel_rolls_back() {
        let (mut ledger, time) = setup();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();

        ledger.custody_mut().reject_transfers_to(BORROWER);
        let before = ledger.get_loan(id).unwrap().clone();

        assert!(matches!(
            ledger.cancel_loan(id, &BORROWER, &time),
            Err(LedgerError::TransferFailed { .. })
        ));
        assert_eq!(ledger.get_loan(id).unwrap(), &before);
        assert_eq!(ledger.status(id, &time).unwrap(), LoanStatus::Listed);
        assert!(ledger.custody().is_escrowed(&NFT, 1));
        assert_eq!(ledger.snapshots.len(), 1);
    }

    #[test]
    fn test_failed_seizure_rolls_back() {
        let (mut ledger, time) = setup();
        let control = time.test_control().unwrap();
        let id = ledger.create_loan(BORROWER, terms(1, &time), &time).unwrap();
        ledger.underwrite(id, bid(ALICE, Money::ONE_ETHER, Money::ONE_ETHER), &time).unwrap();

        control.advance(Duration::days(7));
        ledger.custody_mut().reject_transfers_to(ALICE);
        let before = ledger.get_loan(id).unwrap().clone();

        assert!(matches!(
            ledger.seize_collateral(id, &CAROL, &time),
            Err(LedgerError::TransferFailed { .. })
        ));
        assert_eq!(ledger.get_loan(id).unwrap(), &before);
        assert_eq!(ledger.status(id, &time).unwrap(), LoanStatus::Defaulted);
        assert!(ledger.custody().is_escrowed(&NFT, 1));

        ledger.custody_mut().accept_transfers_to(&ALICE);
        ledger.seize_collateral(id, &CAROL, &time).unwrap();
        assert_eq!(ledger.custody().owner_of(&NFT, 1), Some(ALICE));
    }
}
