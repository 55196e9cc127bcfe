pub mod in_memory;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::decimal::Money;
use crate::errors::Result;
use crate::types::{Address, CollateralId};

pub use in_memory::InMemoryCustody;

/// asset and capital rails the ledger settles through
///
/// Each primitive either completes or returns an error. `snapshot` and
/// `restore` let the ledger undo the earlier steps of a plan when a later
/// step fails.
pub trait Custody {
    type Snapshot;

    /// pull a collateral unit from `from` into escrow
    fn transfer_asset_in(&mut self, asset: &Address, id: CollateralId, from: &Address) -> Result<()>;

    /// release an escrowed collateral unit to `to`
    fn transfer_asset_out(&mut self, asset: &Address, id: CollateralId, to: &Address) -> Result<()>;

    /// pay `amount` out of the ledger's holding to `to`
    fn transfer_value(&mut self, to: &Address, amount: Money) -> Result<()>;

    /// take `amount` from `from` into the ledger's holding
    fn accept_value(&mut self, from: &Address, amount: Money) -> Result<()>;

    fn snapshot(&self) -> Self::Snapshot;

    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// one step of a settlement plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transfer {
    AssetIn {
        asset: Address,
        id: CollateralId,
        from: Address,
    },
    AssetOut {
        asset: Address,
        id: CollateralId,
        to: Address,
    },
    AcceptValue {
        from: Address,
        amount: Money,
    },
    PayValue {
        to: Address,
        amount: Money,
    },
}

impl Transfer {
    fn apply<C: Custody>(&self, custody: &mut C) -> Result<()> {
        match self {
            Transfer::AssetIn { asset, id, from } => custody.transfer_asset_in(asset, *id, from),
            Transfer::AssetOut { asset, id, to } => custody.transfer_asset_out(asset, *id, to),
            Transfer::AcceptValue { from, amount } => custody.accept_value(from, *amount),
            Transfer::PayValue { to, amount } => custody.transfer_value(to, *amount),
        }
    }
}

/// ordered list of transfers applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferPlan {
    steps: Vec<Transfer>,
}

impl TransferPlan {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn push(&mut self, transfer: Transfer) {
        self.steps.push(transfer);
    }

    /// queue a value payment, skipping zero amounts
    pub fn pay(&mut self, to: Address, amount: Money) {
        if amount.is_positive() {
            self.steps.push(Transfer::PayValue { to, amount });
        }
    }

    /// queue a value deposit, skipping zero amounts
    pub fn accept(&mut self, from: Address, amount: Money) {
        if amount.is_positive() {
            self.steps.push(Transfer::AcceptValue { from, amount });
        }
    }

    pub fn steps(&self) -> &[Transfer] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// run every step, restoring the rails if any step fails
    pub fn execute<C: Custody>(&self, custody: &mut C) -> Result<()> {
        let checkpoint = custody.snapshot();
        for (index, step) in self.steps.iter().enumerate() {
            if let Err(err) = step.apply(custody) {
                warn!(step = index, ?step, error = %err, "transfer failed, reverting plan");
                custody.restore(checkpoint);
                return Err(err);
            }
        }
        Ok(())
    }
}
