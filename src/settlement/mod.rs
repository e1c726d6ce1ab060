//! Purchase Settlement
//!
//! Turns a buyer's intent to purchase a listing into either a settled,
//! recorded purchase with money moved to the seller, or a clean failure.
//!
//! # Architecture
//!
//! A persistent FSM in the purchase ledger sequences three calls to the
//! external payment provider:
//! - **quote**: price the payout (no side effect)
//! - **transfer**: move the money, keyed by the purchase id
//! - **status**: confirm the transfer completed
//!
//! # State Machine
//!
//! ```text
//! INITIATED → TRANSFER_REQUESTED → SETTLED
//!     ↓               ↓
//!   FAILED          FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Record-Before-Transfer**: the ledger row exists before money moves
//! 2. **One Key Per Attempt**: the purchase id is the transfer idempotency key
//!    and is reused when an INITIATED attempt is resumed
//! 3. **One Active Row Per Pair**: in-process lease plus ledger unique index
//! 4. **Access From Ledger Only**: access is granted by SETTLED rows, never by
//!    a provider response alone

pub mod access;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod provider;
pub mod state;
pub mod types;
pub mod worker;


pub use access::AccessGate;
pub use error::{LedgerError, ProviderError, SettlementError};
pub use ledger::{MemoryLedger, PgLedger, PurchaseLedger};
pub use orchestrator::{SettlementConfig, SettlementOrchestrator};
pub use provider::{PaymentProvider, WiseClient, WiseConfig};
#[cfg(any(test, feature = "mock-provider"))]
pub use provider::ScriptedProvider;
pub use state::PurchaseState;
pub use types::{
    ListingId, PurchaseId, PurchaseRecord, Quote, SettlementOutcome, TransferHandle,
    TransferStatus, UserId,
};
pub use worker::{RecoveryWorker, WorkerConfig};
