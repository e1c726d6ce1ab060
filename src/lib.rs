//! Codemart - purchase settlement for a code marketplace
//!
//! Turns "buyer wants listing X" into a settled, recorded purchase with the
//! seller paid through an external payment provider, or a clean failure.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier newtypes (ListingId, UserId, PurchaseId)
//! - [`listing`] - Read access to marketplace listings
//! - [`settlement`] - Purchase ledger, provider clients, orchestrator,
//!   access gate and recovery sweep
//! - [`gateway`] - HTTP API
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL pool

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod gateway;
pub mod listing;
pub mod logging;
pub mod settlement;

// Convenient re-exports at crate root
pub use core_types::{ListingId, PurchaseId, UserId};
pub use listing::{Listing, ListingStatus, ListingStore};
pub use settlement::{
    AccessGate, PaymentProvider, PurchaseLedger, PurchaseRecord, PurchaseState,
    SettlementConfig, SettlementError, SettlementOrchestrator, SettlementOutcome,
};
