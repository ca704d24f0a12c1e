//! On-chain collaborators.
//!
//! Balance lookups and swap execution sit behind traits so the engine can be
//! driven by a JSON-RPC node, a dry-run executor, or in-memory fakes.

pub mod dry_run;
pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{Asset, Quote};

/// Outcome of a submitted swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// Transaction hash, or a synthetic reference for dry runs.
    pub tx_ref: String,
    pub gas_used: Option<u64>,
}

/// Read-only wallet view.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    /// Native currency held by the wallet, in whole units.
    async fn native_balance(&self) -> Result<Decimal>;

    /// Token held by the wallet, scaled by `token.decimals`.
    async fn token_balance(&self, token: &Asset) -> Result<Decimal>;

    async fn token_decimals(&self, token_address: &str) -> Result<u32>;
}

/// Submits a quote's transaction and waits for it to be mined.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapExecutor: Send + Sync {
    async fn execute(&self, quote: &Quote) -> Result<ExecutionReceipt>;
}
