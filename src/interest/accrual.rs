use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::config::SECONDS_PER_YEAR;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::interest::{InterestCalculation, InterestCalculator};
use crate::state::Loan;

/// simple (non-compounding) interest over elapsed seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualEngine {
    pub seconds_per_year: u64,
}

impl Default for AccrualEngine {
    fn default() -> Self {
        Self::new(SECONDS_PER_YEAR)
    }
}

impl AccrualEngine {
    pub fn new(seconds_per_year: u64) -> Self {
        Self { seconds_per_year }
    }

    /// whole seconds from `start` to `end`, zero if `end` is not after `start`
    pub fn elapsed_seconds(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        (end - start).num_seconds().max(0) as u64
    }

    /// `principal * rate * seconds / seconds_per_year`, truncated to whole wei
    ///
    /// The rate is scaled to an integer first so the whole computation is an
    /// exact `u128` product followed by one floor division.
    pub fn calculate_simple_interest(
        &self,
        principal: Money,
        annual_rate: Rate,
        seconds: u64,
    ) -> Result<Money> {
        if seconds == 0 || principal.is_zero() || annual_rate.as_decimal().is_zero() {
            return Ok(Money::ZERO);
        }
        if self.seconds_per_year == 0 {
            return Err(LedgerError::CalculationError {
                message: "seconds_per_year must be positive".to_string(),
            });
        }

        let wei = principal
            .as_decimal()
            .to_u128()
            .ok_or_else(|| invalid("principal must be non-negative"))?;
        let rate = annual_rate.as_decimal().normalize();
        let rate_units =
            u128::try_from(rate.mantissa()).map_err(|_| invalid("rate must be non-negative"))?;
        let rate_scale = 10u128
            .checked_pow(rate.scale())
            .ok_or_else(|| overflow("rate scale"))?;

        let factor = rate_units
            .checked_mul(u128::from(seconds))
            .ok_or_else(|| overflow("rate factor"))?;
        let denominator = rate_scale
            .checked_mul(u128::from(self.seconds_per_year))
            .ok_or_else(|| overflow("interest denominator"))?;

        let quotient =
            mul_div_floor(wei, factor, denominator).ok_or_else(|| overflow("interest numerator"))?;
        Decimal::from_u128(quotient)
            .map(Money::from_decimal)
            .ok_or_else(|| overflow("interest amount"))
    }

    /// interest owed to the current lender for holding the top bid until `at`
    pub fn accrued_interest(&self, loan: &Loan, at: DateTime<Utc>) -> Result<Money> {
        let Some(last_bid) = loan.last_bid_time else {
            return Ok(Money::ZERO);
        };
        let seconds = self.elapsed_seconds(last_bid, at);
        self.calculate_simple_interest(loan.loan_amount, loan.interest_rate, seconds)
    }

    /// interest paid to displaced lenders plus interest accrued to the current one
    pub fn total_interest(&self, loan: &Loan, at: DateTime<Utc>) -> Result<Money> {
        let accrued = self.accrued_interest(loan, at)?;
        loan.historic_interest
            .checked_add(accrued)
            .ok_or_else(|| overflow("total interest"))
    }

    /// amount a repayer must deposit to discharge the loan at `at`
    ///
    /// The undrawn principal is already escrowed and goes back to the lender
    /// from there, so only drawn principal is owed on top of interest.
    pub fn required_repayment(&self, loan: &Loan, at: DateTime<Utc>) -> Result<Money> {
        let interest = self.total_interest(loan, at)?;
        loan.loan_amount_drawn
            .checked_add(interest)
            .ok_or_else(|| overflow("required repayment"))
    }

    /// deposit needed to replace the current top bid with `bid_amount` at `at`
    ///
    /// The new bidder buys out the current lender's whole position, which
    /// includes the interest that lender paid its own predecessors.
    pub fn outbid_cost(&self, loan: &Loan, bid_amount: Money, at: DateTime<Utc>) -> Result<Money> {
        let interest = self.total_interest(loan, at)?;
        bid_amount
            .checked_add(interest)
            .ok_or_else(|| overflow("outbid cost"))
    }
}

impl InterestCalculator for AccrualEngine {
    fn calculate_interest(
        &self,
        principal: Money,
        rate: Rate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InterestCalculation> {
        let seconds = self.elapsed_seconds(start, end);
        let interest = self.calculate_simple_interest(principal, rate, seconds)?;

        Ok(InterestCalculation {
            interest_amount: interest,
            annual_rate: rate,
            seconds,
            principal_base: principal,
        })
    }
}

/// `floor(a * b / d)` without losing precision when `a * b` exceeds `u128`
fn mul_div_floor(a: u128, b: u128, d: u128) -> Option<u128> {
    if let Some(product) = a.checked_mul(b) {
        return Some(product / d);
    }
    // a = q*d + r, so a*b/d = q*b + r*b/d
    let (q, r) = (a / d, a % d);
    q.checked_mul(b)?.checked_add(r.checked_mul(b)? / d)
}

fn invalid(message: &str) -> LedgerError {
    LedgerError::CalculationError {
        message: message.to_string(),
    }
}

fn overflow(what: &str) -> LedgerError {
    LedgerError::CalculationError {
        message: format!("{} overflowed", what),
    }
}
