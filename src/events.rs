use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{Address, CollateralId, LoanId};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanCreated {
        loan_id: LoanId,
        borrower: Address,
        collateral_asset: Address,
        collateral_id: CollateralId,
        interest_rate: Rate,
        max_loan_amount: Money,
        loan_complete_time: DateTime<Utc>,
    },
    LoanCancelled {
        loan_id: LoanId,
        borrower: Address,
        timestamp: DateTime<Utc>,
    },

    // bidding events
    LoanUnderwritten {
        loan_id: LoanId,
        lender: Address,
        loan_amount: Money,
        /// lender displaced by this bid, with what they were paid back
        displaced: Option<DisplacedLender>,
        timestamp: DateTime<Utc>,
    },

    // settlement events
    LoanDrawn {
        loan_id: LoanId,
        borrower: Address,
        amount: Money,
        total_drawn: Money,
        timestamp: DateTime<Utc>,
    },
    LoanRepaid {
        loan_id: LoanId,
        payer: Address,
        lender: Address,
        principal: Money,
        interest: Money,
        timestamp: DateTime<Utc>,
    },
    CollateralSeized {
        loan_id: LoanId,
        lender: Address,
        collateral_asset: Address,
        collateral_id: CollateralId,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplacedLender {
    pub lender: Address,
    pub principal: Money,
    pub interest: Money,
}

impl Event {
    pub fn loan_id(&self) -> LoanId {
        match self {
            Event::LoanCreated { loan_id, .. }
            | Event::LoanCancelled { loan_id, .. }
            | Event::LoanUnderwritten { loan_id, .. }
            | Event::LoanDrawn { loan_id, .. }
            | Event::LoanRepaid { loan_id, .. }
            | Event::CollateralSeized { loan_id, .. } => *loan_id,
        }
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// events concerning a single loan, in emission order
    pub fn for_loan(&self, loan_id: LoanId) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.loan_id() == loan_id)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
