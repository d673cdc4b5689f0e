//! Configuration management with validation and defaults
//!
//! Layered: built-in defaults, optional TOML file, environment overrides
//! (`FUNDROOM_*`). Validated once at load; the rest of the crate consumes
//! the typed result and never re-checks.

use crate::errors::{SettlementError, SettleResult};
use crate::ledger::LedgerFamily;
use crate::pipeline::PipelineConfig;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Top-level settlement-layer configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FundroomConfig {
    pub ledger: LedgerConfig,
    pub charity: CharityConfig,
    pub pipeline: PipelineSettings,
    pub platform: PlatformConfig,
}

/// Which ledger the client targets and where to reach it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub family: LedgerFamily,
    /// Network tag passed to external collaborators ("mainnet", "devnet").
    pub network: String,
    pub primary_url: String,
    /// Independent read endpoint used when primary confirmation reads fail.
    pub fallback_url: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            family: LedgerFamily::TokenAccount,
            network: "devnet".to_string(),
            primary_url: "http://127.0.0.1:8899".to_string(),
            fallback_url: "http://127.0.0.1:8900".to_string(),
        }
    }
}

/// Charity routing collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CharityConfig {
    pub router_url: String,
    pub request_timeout_ms: u64,
}

impl Default for CharityConfig {
    fn default() -> Self {
        Self {
            router_url: "http://127.0.0.1:9000".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Transaction pipeline tunables, in file-friendly integer form.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub confirm_timeout_ms: u64,
    pub confirm_poll_interval_ms: u64,
    pub max_confirm_failures: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: 75_000,
            confirm_poll_interval_ms: 1_500,
            max_confirm_failures: 3,
        }
    }
}

/// Platform-side accounts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Destination of the fixed platform share.
    pub fee_account: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            fee_account: "platform-fee-vault".to_string(),
        }
    }
}

impl FundroomConfig {
    /// Load from a TOML file, then apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> SettleResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SettlementError::Config(format!("read {}: {}", path.as_ref().display(), e))
        })?;
        let mut config: Self = toml::from_str(&raw)
            .map_err(|e| SettlementError::Config(format!("parse config: {}", e)))?;
        config.apply_env_overrides();
        config.validate()?;
        info!(
            family = %config.ledger.family,
            network = %config.ledger.network,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Defaults plus environment overrides, for deployments without a file.
    pub fn from_env() -> SettleResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FUNDROOM_LEDGER_FAMILY") {
            match v.as_str() {
                "allowance" => self.ledger.family = LedgerFamily::Allowance,
                "token_account" | "token-account" => {
                    self.ledger.family = LedgerFamily::TokenAccount
                }
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("FUNDROOM_NETWORK") {
            self.ledger.network = v;
        }
        if let Ok(v) = std::env::var("FUNDROOM_PRIMARY_URL") {
            self.ledger.primary_url = v;
        }
        if let Ok(v) = std::env::var("FUNDROOM_FALLBACK_URL") {
            self.ledger.fallback_url = v;
        }
        if let Ok(v) = std::env::var("FUNDROOM_CHARITY_ROUTER_URL") {
            self.charity.router_url = v;
        }
        if let Ok(v) = std::env::var("FUNDROOM_PLATFORM_FEE_ACCOUNT") {
            self.platform.fee_account = v;
        }
    }

    /// Validate for logical consistency.
    pub fn validate(&self) -> SettleResult<()> {
        if self.ledger.primary_url.is_empty() {
            return Err(SettlementError::Config(
                "ledger.primary_url must be set".to_string(),
            ));
        }
        if self.ledger.fallback_url.is_empty() {
            return Err(SettlementError::Config(
                "ledger.fallback_url must be set".to_string(),
            ));
        }
        if self.ledger.fallback_url == self.ledger.primary_url {
            return Err(SettlementError::Config(
                "fallback_url must be an endpoint independent of primary_url".to_string(),
            ));
        }
        if self.charity.router_url.is_empty() {
            return Err(SettlementError::Config(
                "charity.router_url must be set".to_string(),
            ));
        }
        if self.pipeline.confirm_timeout_ms == 0 || self.pipeline.confirm_poll_interval_ms == 0 {
            return Err(SettlementError::Config(
                "pipeline timings must be > 0".to_string(),
            ));
        }
        if self.pipeline.confirm_poll_interval_ms >= self.pipeline.confirm_timeout_ms {
            return Err(SettlementError::Config(
                "confirm_poll_interval_ms must be below confirm_timeout_ms".to_string(),
            ));
        }
        if self.pipeline.max_confirm_failures == 0 {
            return Err(SettlementError::Config(
                "max_confirm_failures must be > 0".to_string(),
            ));
        }
        self.platform_account()?;
        Ok(())
    }

    /// The validated platform fee destination.
    pub fn platform_account(&self) -> SettleResult<AccountId> {
        AccountId::new(&self.platform.fee_account)
            .map_err(|e| SettlementError::Config(format!("platform.fee_account: {}", e)))
    }

    /// Convert the pipeline section to its runtime form.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            confirm_timeout: Duration::from_millis(self.pipeline.confirm_timeout_ms),
            confirm_poll_interval: Duration::from_millis(self.pipeline.confirm_poll_interval_ms),
            max_confirm_failures: self.pipeline.max_confirm_failures,
        }
    }

    pub fn charity_timeout(&self) -> Duration {
        Duration::from_millis(self.charity.request_timeout_ms)
    }
}
