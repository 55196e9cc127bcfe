use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// wei per ether (10^18)
pub const WEI_PER_ETHER: Decimal = Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0);

/// Value amount held in the chain's minimum denomination (wei).
///
/// The inner decimal always has scale 0; every constructor and operator
/// truncates toward zero, so two equal amounts are equal bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE_WEI: Money = Money(Decimal::ONE);
    pub const ONE_ETHER: Money = Money(WEI_PER_ETHER);

    /// create from a decimal wei amount, truncating any fraction
    pub fn from_decimal(d: Decimal) -> Self {
        Money(d.trunc().normalize())
    }

    /// create from an integer wei amount
    pub fn from_wei(wei: u64) -> Self {
        Money(Decimal::from(wei))
    }

    /// create from whole ether
    pub fn from_major(ether: u32) -> Self {
        Money(Decimal::from(ether) * WEI_PER_ETHER)
    }

    /// parse an ether-denominated string such as "1.5"
    pub fn from_ether(s: &str) -> Result<Self, rust_decimal::Error> {
        let ether = Decimal::from_str(s)?;
        ether
            .checked_mul(WEI_PER_ETHER)
            .map(Money::from_decimal)
            .ok_or(rust_decimal::Error::ExceedsMaximumPossibleValue)
    }

    /// get underlying wei decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// amount expressed in ether
    pub fn to_ether(&self) -> Decimal {
        (self.0 / WEI_PER_ETHER).normalize()
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// difference floored at zero
    pub fn saturating_sub(self, other: Self) -> Self {
        if other >= self {
            Money::ZERO
        } else {
            Money(self.0 - other.0)
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    /// parses a wei amount
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Money::from_decimal(Decimal::from_str(s)?))
    }
}

impl From<u64> for Money {
    fn from(wei: u64) -> Self {
        Money::from_wei(wei)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        self.0 -= other.0;
    }
}

/// rate type for annual interest rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from decimal (e.g., 0.05 for 5%)
    pub fn from_decimal(d: Decimal) -> Self {
        Rate(d.normalize())
    }

    /// create from percentage (e.g., 5 for 5%)
    pub fn from_percentage(p: u32) -> Self {
        Rate::from_decimal(Decimal::from(p) / Decimal::from(100))
    }

    /// create from basis points (e.g., 500 for 5%)
    pub fn from_bps(bps: u32) -> Self {
        Rate::from_decimal(Decimal::from(bps) / Decimal::from(10000))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn as_percentage(&self) -> Decimal {
        (self.0 * Decimal::from(100)).normalize()
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage())
    }
}

impl From<Decimal> for Rate {
    fn from(d: Decimal) -> Self {
        Rate::from_decimal(d)
    }
}
