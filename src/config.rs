use std::fs;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::listing::Listing;
use crate::settlement::{SettlementConfig, WiseConfig, WorkerConfig};

/// Environment variable that overrides `provider.api_key`
pub const API_KEY_ENV: &str = "PAYMENT_API_KEY";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL URL for ledger and listings. Absent: in-memory stores.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub settlement: SettlementSection,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Seed for the in-memory listing store
    #[serde(default)]
    pub dev_listings: Vec<Listing>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SettlementSection {
    pub currency: String,
    pub stale_after_secs: u64,
    pub provider_call_timeout_ms: u64,
}

impl Default for SettlementSection {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            stale_after_secs: 900,
            provider_call_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Wise,
    Mock,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    pub mode: ProviderMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub profile_id: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_base_url() -> String {
    "https://api.transferwise.com".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub min_age_secs: u64,
    pub batch_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: 30,
            min_age_secs: 60,
            batch_size: 100,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))?;

        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => config.provider.api_key = key,
            _ => {}
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.mode == ProviderMode::Wise {
            anyhow::ensure!(
                !self.provider.api_key.is_empty(),
                "provider.api_key (or {}) is required in wise mode",
                API_KEY_ENV
            );
            anyhow::ensure!(
                !self.provider.profile_id.is_empty(),
                "provider.profile_id is required in wise mode"
            );
        }
        anyhow::ensure!(
            self.provider.max_attempts >= 1,
            "provider.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            !self.settlement.currency.is_empty(),
            "settlement.currency must not be empty"
        );
        Ok(())
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            currency: self.settlement.currency.clone(),
            stale_after: Duration::from_secs(self.settlement.stale_after_secs),
            provider_call_timeout: Duration::from_millis(self.settlement.provider_call_timeout_ms),
        }
    }

    pub fn wise_config(&self) -> WiseConfig {
        WiseConfig {
            base_url: self.provider.base_url.clone(),
            api_key: self.provider.api_key.clone(),
            profile_id: self.provider.profile_id.clone(),
            request_timeout: Duration::from_millis(self.provider.request_timeout_ms),
            max_attempts: self.provider.max_attempts,
            initial_backoff: Duration::from_millis(self.provider.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.provider.max_backoff_ms),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            scan_interval: Duration::from_secs(self.recovery.scan_interval_secs),
            min_age: Duration::from_secs(self.recovery.min_age_secs),
            stale_after: Duration::from_secs(self.settlement.stale_after_secs),
            batch_size: self.recovery.batch_size,
        }
    }
}
