//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the aggregator API key, the wallet address) are referenced by
//! env-var name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::Secret;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::quote::cache::KeyPrecision;
use crate::quote::rate_limiter::RateLimiterConfig;
use crate::types::{HunterError, ProfitTier, TierLadder, DEFAULT_DECIMALS};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Log swaps instead of executing them.
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub rpc_url: String,
    /// Env var holding the wallet address.
    pub wallet_address_env: String,
    #[serde(default = "default_decimals")]
    pub native_decimals: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Env var holding the optional LI.FI API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: None,
            timeout_secs: None,
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_minute")]
    pub requests_per_minute: usize,
    #[serde(default = "default_per_hour")]
    pub requests_per_hour: usize,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_per_minute(),
            requests_per_hour: default_per_hour(),
            backoff_cap_secs: default_backoff_cap(),
            exponential_backoff: true,
        }
    }
}

impl RateLimitConfig {
    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_minute: self.requests_per_minute,
            requests_per_hour: self.requests_per_hour,
            backoff_cap: Duration::from_secs(self.backoff_cap_secs),
            exponential_backoff: self.exponential_backoff,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_amount_decimals")]
    pub amount_decimals: u32,
    #[serde(default = "default_slippage_decimals")]
    pub slippage_decimals: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl(),
            amount_decimals: default_amount_decimals(),
            slippage_decimals: default_slippage_decimals(),
        }
    }
}

impl CacheConfig {
    pub fn key_precision(&self) -> KeyPrecision {
        KeyPrecision {
            amount_decimals: self.amount_decimals,
            slippage_decimals: self.slippage_decimals,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    /// Native currency spent per acquisition.
    #[serde(default = "default_investment")]
    pub initial_investment: Decimal,
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default)]
    pub wait_for_liquidity: bool,
    #[serde(default = "default_liquidity_retry")]
    pub liquidity_retry_secs: u64,
    #[serde(default = "TierLadder::default_tiers")]
    pub tiers: Vec<ProfitTier>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            initial_investment: default_investment(),
            slippage: default_slippage(),
            max_positions: default_max_positions(),
            wait_for_liquidity: false,
            liquidity_retry_secs: default_liquidity_retry(),
            tiers: TierLadder::default_tiers(),
        }
    }
}

fn default_check_interval() -> u64 {
    60
}
fn default_state_file() -> String {
    crate::storage::DEFAULT_STATE_FILE.to_string()
}
fn default_true() -> bool {
    true
}
fn default_chain_id() -> u64 {
    56
}
fn default_decimals() -> u32 {
    DEFAULT_DECIMALS
}
fn default_max_retries() -> u32 {
    crate::quote::DEFAULT_MAX_RETRIES
}
fn default_per_minute() -> usize {
    8
}
fn default_per_hour() -> usize {
    80
}
fn default_backoff_cap() -> u64 {
    60
}
fn default_ttl() -> u64 {
    crate::quote::cache::DEFAULT_TTL_SECS
}
fn default_amount_decimals() -> u32 {
    8
}
fn default_slippage_decimals() -> u32 {
    4
}
fn default_investment() -> Decimal {
    dec!(0.05)
}
fn default_slippage() -> Decimal {
    dec!(0.15)
}
fn default_max_positions() -> usize {
    5
}
fn default_liquidity_retry() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), HunterError> {
        self.ladder()?;
        if self.rate_limit.requests_per_minute == 0 || self.rate_limit.requests_per_hour == 0 {
            return Err(HunterError::Config("rate limits must be positive".into()));
        }
        if self.aggregator.max_retries == 0 {
            return Err(HunterError::Config("aggregator.max_retries must be at least 1".into()));
        }
        if self.agent.check_interval_secs == 0 {
            return Err(HunterError::Config("agent.check_interval_secs must be positive".into()));
        }
        if self.strategy.initial_investment <= Decimal::ZERO {
            return Err(HunterError::Config("strategy.initial_investment must be positive".into()));
        }
        if self.strategy.slippage <= Decimal::ZERO || self.strategy.slippage >= Decimal::ONE {
            return Err(HunterError::Config("strategy.slippage must be in (0, 1)".into()));
        }
        if self.strategy.max_positions == 0 {
            return Err(HunterError::Config("strategy.max_positions must be at least 1".into()));
        }
        Ok(())
    }

    /// Validated take-profit ladder.
    pub fn ladder(&self) -> Result<TierLadder, HunterError> {
        TierLadder::new(self.strategy.tiers.clone())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.agent.check_interval_secs)
    }

    /// Optional aggregator API key, if an env var is configured and set.
    pub fn aggregator_api_key(&self) -> Option<Secret<String>> {
        self.aggregator
            .api_key_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|key| !key.is_empty())
            .map(Secret::new)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
