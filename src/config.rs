use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, Result};
use crate::types::Address;

/// seconds in a 365-day year
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// forward buffer used when quoting amounts for a pending call
pub const DEFAULT_SETTLEMENT_BUFFER_SECS: u64 = 120;

/// longest quote buffer accepted by `validate`
pub const MAX_SETTLEMENT_BUFFER_SECS: u64 = 86_400;

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// identity holding escrowed collateral and undrawn capital
    pub ledger_address: Address,
    /// how far ahead quotes project interest, so a deposit sized now is
    /// still sufficient when the call lands
    pub settlement_buffer_secs: u64,
    /// year basis for simple interest
    pub seconds_per_year: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            ledger_address: Address::repeat_byte(0xee),
            settlement_buffer_secs: DEFAULT_SETTLEMENT_BUFFER_SECS,
            seconds_per_year: SECONDS_PER_YEAR,
        }
    }
}

impl LedgerConfig {
    /// configuration for slow test networks, where calls take longer to land
    pub fn testnet() -> Self {
        Self {
            settlement_buffer_secs: 600,
            ..Self::default()
        }
    }

    pub fn with_ledger_address(mut self, address: Address) -> Self {
        self.ledger_address = address;
        self
    }

    pub fn with_settlement_buffer_secs(mut self, secs: u64) -> Self {
        self.settlement_buffer_secs = secs;
        self
    }

    pub fn with_seconds_per_year(mut self, secs: u64) -> Self {
        self.seconds_per_year = secs;
        self
    }

    pub fn settlement_buffer(&self) -> Duration {
        // clamped for configs that never went through validate
        Duration::seconds(self.settlement_buffer_secs.min(MAX_SETTLEMENT_BUFFER_SECS) as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger_address.is_zero() {
            return Err(LedgerError::InvalidConfiguration {
                message: "ledger address cannot be the zero address".to_string(),
            });
        }
        if self.seconds_per_year == 0 {
            return Err(LedgerError::InvalidConfiguration {
                message: "seconds_per_year must be positive".to_string(),
            });
        }
        if self.settlement_buffer_secs > MAX_SETTLEMENT_BUFFER_SECS {
            return Err(LedgerError::InvalidConfiguration {
                message: format!(
                    "settlement buffer of {}s exceeds the {}s maximum",
                    self.settlement_buffer_secs, MAX_SETTLEMENT_BUFFER_SECS
                ),
            });
        }
        if self.settlement_buffer_secs > self.seconds_per_year {
            return Err(LedgerError::InvalidConfiguration {
                message: format!(
                    "settlement buffer of {}s exceeds a year",
                    self.settlement_buffer_secs
                ),
            });
        }
        Ok(())
    }

    /// load and validate from json
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LedgerConfig =
            serde_json::from_str(json).map_err(|e| LedgerError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LedgerError::InvalidConfiguration {
            message: e.to_string(),
        })
    }
}
