use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::decimal::Money;

/// index of a loan in the ledger, assigned in creation order
pub type LoanId = u64;

/// serial of a collateral unit within its asset class
pub type CollateralId = u64;

/// 20-byte account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// zero address, used as the "nobody" sentinel
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// address with every byte set to `byte`
    pub const fn repeat_byte(byte: u8) -> Self {
        Address([byte; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address must be 40 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex in address: {0}")]
    InvalidHex(String),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if hex.len() != 40 {
            return Err(AddressParseError::InvalidLength(hex.len()));
        }

        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = hex
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| AddressParseError::InvalidHex(s.to_string()))?;
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| AddressParseError::InvalidHex(s.to_string()))?;
        }
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// loan status derived from the record and the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// collateral escrowed, no bids yet
    Listed,
    /// has a lender, deadline not reached
    Underwritten,
    /// has a lender, deadline passed without repayment
    Defaulted,
    /// no bids and deadline passed; only cancellation remains
    Lapsed,
    /// withdrawn by the borrower before any bid
    Cancelled,
    /// principal and interest returned to the lender
    Repaid,
    /// collateral transferred to the lender
    Seized,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Cancelled | LoanStatus::Repaid | LoanStatus::Seized
        )
    }
}

/// how a loan was retired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    Cancelled {
        borrower: Address,
        timestamp: DateTime<Utc>,
    },
    Repaid {
        borrower: Address,
        payer: Address,
        principal: Money,
        interest: Money,
        timestamp: DateTime<Utc>,
    },
    Seized {
        borrower: Address,
        lender: Address,
        principal: Money,
        timestamp: DateTime<Utc>,
    },
}

impl Settlement {
    pub fn status(&self) -> LoanStatus {
        match self {
            Settlement::Cancelled { .. } => LoanStatus::Cancelled,
            Settlement::Repaid { .. } => LoanStatus::Repaid,
            Settlement::Seized { .. } => LoanStatus::Seized,
        }
    }

    /// borrower that owned the collateral before the record was retired
    pub fn borrower(&self) -> Address {
        match self {
            Settlement::Cancelled { borrower, .. }
            | Settlement::Repaid { borrower, .. }
            | Settlement::Seized { borrower, .. } => *borrower,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Settlement::Cancelled { timestamp, .. }
            | Settlement::Repaid { timestamp, .. }
            | Settlement::Seized { timestamp, .. } => *timestamp,
        }
    }
}
