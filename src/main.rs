use std::sync::Arc;

use anyhow::Context;

use codemart::config::{AppConfig, ProviderMode};
use codemart::db::Database;
use codemart::gateway::{self, AppState};
use codemart::listing::{ListingStore, MemoryListingStore, PgListingStore};
use codemart::settlement::{
    MemoryLedger, PaymentProvider, PgLedger, PurchaseLedger, RecoveryWorker,
    SettlementOrchestrator, WiseClient,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

type Stores = (
    Arc<dyn PurchaseLedger>,
    Arc<dyn ListingStore>,
    Option<Arc<Database>>,
);

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match config.postgres_url.as_deref() {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            let ledger = PgLedger::new(db.pool().clone());
            ledger
                .ensure_schema()
                .await
                .context("Failed to create purchase ledger schema")?;
            let listings = PgListingStore::new(db.pool().clone());
            tracing::info!("Using PostgreSQL ledger and listing store");
            Ok((Arc::new(ledger), Arc::new(listings), Some(Arc::new(db))))
        }
        None => {
            tracing::warn!(
                listings = config.dev_listings.len(),
                "No postgres_url configured, using in-memory stores"
            );
            Ok((
                Arc::new(MemoryLedger::new()),
                Arc::new(MemoryListingStore::with_listings(
                    config.dev_listings.iter().cloned(),
                )),
                None,
            ))
        }
    }
}

fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentProvider>> {
    match config.provider.mode {
        ProviderMode::Wise => {
            let client = WiseClient::new(config.wise_config())
                .map_err(|e| anyhow::anyhow!("Failed to build Wise client: {}", e))?;
            Ok(Arc::new(client))
        }
        #[cfg(feature = "mock-provider")]
        ProviderMode::Mock => {
            tracing::warn!("Using scripted mock provider, no money moves");
            Ok(Arc::new(codemart::settlement::ScriptedProvider::new()))
        }
        #[cfg(not(feature = "mock-provider"))]
        ProviderMode::Mock => {
            anyhow::bail!("provider.mode = mock requires the 'mock-provider' feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env)?;
    let _log_guard = codemart::logging::init_logging(&config);

    tracing::info!(
        env = %env,
        version = env!("GIT_HASH"),
        provider = ?config.provider.mode,
        "Starting codemart settlement service"
    );

    let (ledger, listings, pg_db) = open_stores(&config).await?;
    let provider = build_provider(&config)?;
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        ledger,
        listings,
        provider,
        config.settlement_config(),
    ));

    if config.recovery.enabled {
        let worker = RecoveryWorker::new(orchestrator.clone(), config.worker_config());
        tokio::spawn(async move {
            worker.run().await;
        });
    }

    let port = get_port_override().unwrap_or(config.gateway.port);
    let state = Arc::new(AppState::new(orchestrator, pg_db));
    gateway::run_server(&config.gateway.host, port, state).await
}
