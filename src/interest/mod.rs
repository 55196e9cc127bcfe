pub mod accrual;

use chrono::{DateTime, Utc};

use crate::decimal::{Money, Rate};
use crate::errors::Result;

pub use accrual::AccrualEngine;

/// interest calculation result
#[derive(Debug, Clone, PartialEq)]
pub struct InterestCalculation {
    pub interest_amount: Money,
    pub annual_rate: Rate,
    pub seconds: u64,
    pub principal_base: Money,
}

/// trait for interest calculations
pub trait InterestCalculator {
    fn calculate_interest(
        &self,
        principal: Money,
        rate: Rate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InterestCalculation>;
}
