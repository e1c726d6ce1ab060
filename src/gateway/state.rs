use std::sync::Arc;

use crate::db::Database;
use crate::settlement::{AccessGate, SettlementOrchestrator};

/// Gateway shared state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SettlementOrchestrator>,
    pub access_gate: AccessGate,
    /// PostgreSQL pool (None: in-memory stores)
    pub pg_db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SettlementOrchestrator>, pg_db: Option<Arc<Database>>) -> Self {
        let access_gate = AccessGate::new(
            orchestrator.ledger().clone(),
            orchestrator.listings().clone(),
        );
        Self {
            orchestrator,
            access_gate,
            pg_db,
        }
    }
}
