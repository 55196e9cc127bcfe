use std::collections::HashSet;

use crate::errors::{LedgerError, Result};
use crate::types::LoanId;

/// per-loan reentrancy guard
///
/// A loan is held from the start of a mutating call until the call commits
/// or reverts; a second entry for the same loan in that window is refused.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    held: HashSet<LoanId>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, loan_id: LoanId) -> Result<()> {
        if !self.held.insert(loan_id) {
            return Err(LedgerError::ReentrantCall { loan_id });
        }
        Ok(())
    }

    pub fn exit(&mut self, loan_id: LoanId) {
        self.held.remove(&loan_id);
    }

    pub fn is_held(&self, loan_id: LoanId) -> bool {
        self.held.contains(&loan_id)
    }
}
