pub mod config;
pub mod custody;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod guard;
pub mod interest;
pub mod ledger;
pub mod settlement;
pub mod state;
pub mod types;
pub mod underwriting;
pub mod view;

// re-export key types
pub use config::LedgerConfig;
pub use custody::{Custody, InMemoryCustody, Transfer, TransferPlan};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result};
pub use events::{DisplacedLender, Event, EventStore};
pub use interest::{AccrualEngine, InterestCalculation, InterestCalculator};
pub use ledger::{LoanLedger, LoanTerms};
pub use settlement::{DrawReceipt, RepaymentReceipt, SeizureReceipt, SettlementEngine};
pub use state::{Loan, StateSnapshot};
pub use types::{Address, CollateralId, LoanId, LoanStatus, Settlement};
pub use underwriting::{BidQuote, BidReceipt, BidRequest, UnderwritingEngine};
pub use view::{Availability, LedgerView, LoanActions, LoanView};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
