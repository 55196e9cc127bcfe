use std::collections::{HashMap, HashSet};

use crate::custody::Custody;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{Address, CollateralId};

/// custody rails kept in process memory
///
/// Tracks who owns each collateral unit and each account's value balance.
/// Addresses registered with `reject_transfers_to` refuse incoming assets
/// and value, which lets callers exercise the revert path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustody {
    holder: Address,
    balances: HashMap<Address, Money>,
    owners: HashMap<(Address, CollateralId), Address>,
    rejecting: HashSet<Address>,
}

#[derive(Debug, Clone)]
pub struct CustodySnapshot {
    balances: HashMap<Address, Money>,
    owners: HashMap<(Address, CollateralId), Address>,
}

impl InMemoryCustody {
    /// rails whose escrow account is `holder`
    pub fn new(holder: Address) -> Self {
        Self {
            holder,
            ..Self::default()
        }
    }

    pub fn holder(&self) -> Address {
        self.holder
    }

    /// register a collateral unit as owned by `owner`
    pub fn mint_asset(&mut self, asset: Address, id: CollateralId, owner: Address) {
        self.owners.insert((asset, id), owner);
    }

    /// credit an account with value from outside the ledger
    pub fn fund(&mut self, account: Address, amount: Money) {
        *self.balances.entry(account).or_default() += amount;
    }

    pub fn balance_of(&self, account: &Address) -> Money {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// value currently held by the ledger
    pub fn held_value(&self) -> Money {
        self.balance_of(&self.holder)
    }

    pub fn owner_of(&self, asset: &Address, id: CollateralId) -> Option<Address> {
        self.owners.get(&(*asset, id)).copied()
    }

    pub fn is_escrowed(&self, asset: &Address, id: CollateralId) -> bool {
        self.owner_of(asset, id) == Some(self.holder)
    }

    pub fn reject_transfers_to(&mut self, account: Address) {
        self.rejecting.insert(account);
    }

    pub fn accept_transfers_to(&mut self, account: &Address) {
        self.rejecting.remove(account);
    }

    fn ensure_receiving(&self, to: &Address) -> Result<()> {
        if to.is_zero() {
            return Err(LedgerError::TransferFailed {
                reason: "transfer to the zero address".to_string(),
            });
        }
        if self.rejecting.contains(to) {
            return Err(LedgerError::TransferFailed {
                reason: format!("recipient {} rejected the transfer", to),
            });
        }
        Ok(())
    }

    fn debit(&mut self, account: &Address, amount: Money) -> Result<()> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(LedgerError::TransferFailed {
                reason: format!(
                    "{} holds {}, needs {}",
                    account, balance, amount
                ),
            });
        }
        self.balances.insert(*account, balance - amount);
        Ok(())
    }
}

impl Custody for InMemoryCustody {
    type Snapshot = CustodySnapshot;

    fn transfer_asset_in(&mut self, asset: &Address, id: CollateralId, from: &Address) -> Result<()> {
        match self.owner_of(asset, id) {
            Some(owner) if owner == *from => {
                self.owners.insert((*asset, id), self.holder);
                Ok(())
            }
            Some(owner) => Err(LedgerError::TransferFailed {
                reason: format!("{}#{} is owned by {}, not {}", asset, id, owner, from),
            }),
            None => Err(LedgerError::TransferFailed {
                reason: format!("{}#{} does not exist", asset, id),
            }),
        }
    }

    fn transfer_asset_out(&mut self, asset: &Address, id: CollateralId, to: &Address) -> Result<()> {
        if !self.is_escrowed(asset, id) {
            return Err(LedgerError::TransferFailed {
                reason: format!("{}#{} is not in escrow", asset, id),
            });
        }
        self.ensure_receiving(to)?;
        self.owners.insert((*asset, id), *to);
        Ok(())
    }

    fn transfer_value(&mut self, to: &Address, amount: Money) -> Result<()> {
        self.ensure_receiving(to)?;
        let holder = self.holder;
        self.debit(&holder, amount)?;
        *self.balances.entry(*to).or_default() += amount;
        Ok(())
    }

    fn accept_value(&mut self, from: &Address, amount: Money) -> Result<()> {
        self.debit(from, amount)?;
        *self.balances.entry(self.holder).or_default() += amount;
        Ok(())
    }

    fn snapshot(&self) -> CustodySnapshot {
        CustodySnapshot {
            balances: self.balances.clone(),
            owners: self.owners.clone(),
        }
    }

    fn restore(&mut self, snapshot: CustodySnapshot) {
        self.balances = snapshot.balances;
        self.owners = snapshot.owners;
    }
}
