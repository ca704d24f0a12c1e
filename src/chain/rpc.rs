//! JSON-RPC balance source.
//!
//! Reads native and BEP-20 balances for one wallet from any EVM node through
//! an alloy HTTP provider. Amounts stay `U256` until they are scaled into
//! `Decimal`. Nothing here signs or sends transactions.

use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::sol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use super::BalanceSource;
use crate::types::Asset;
use crate::units::scale_down;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

pub type HttpProvider = RootProvider<Ethereum>;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

fn parse_address(raw: &str) -> Result<Address> {
    raw.trim()
        .parse::<Address>()
        .with_context(|| format!("invalid address {raw:?}"))
}

pub struct RpcBalanceSource {
    provider: HttpProvider,
    wallet: Address,
    native_decimals: u32,
    timeout: Duration,
}

impl RpcBalanceSource {
    pub fn new(rpc_url: &str, wallet: &str, native_decimals: u32) -> Result<Self> {
        let url = reqwest::Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL {rpc_url:?}"))?;
        let wallet = parse_address(wallet).context("Invalid wallet address")?;
        Ok(Self {
            provider: RootProvider::new_http(url),
            wallet,
            native_decimals,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    /// Run one provider call under the request timeout.
    async fn bounded<T, E, F>(&self, method: &str, call: F) -> Result<T>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        debug!(method, "RPC request");
        timeout(self.timeout, call)
            .await
            .with_context(|| format!("RPC {method} timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("RPC {method} failed"))
    }

    /// Latest block number. Used as a connectivity probe at startup.
    pub async fn block_number(&self) -> Result<u64> {
        self.bounded("eth_blockNumber", self.provider.get_block_number())
            .await
    }
}

#[async_trait]
impl BalanceSource for RpcBalanceSource {
    async fn native_balance(&self) -> Result<Decimal> {
        let wei: U256 = self
            .bounded("eth_getBalance", self.provider.get_balance(self.wallet))
            .await?;
        Ok(scale_down(wei, self.native_decimals)?)
    }

    async fn token_balance(&self, token: &Asset) -> Result<Decimal> {
        let erc20 = IERC20::new(parse_address(&token.address)?, self.provider.clone());
        let raw: U256 = self
            .bounded("balanceOf", erc20.balanceOf(self.wallet).call())
            .await
            .with_context(|| format!("balanceOf on {}", token.address))?;
        Ok(scale_down(raw, token.decimals)?)
    }

    async fn token_decimals(&self, token_address: &str) -> Result<u32> {
        let erc20 = IERC20::new(parse_address(token_address)?, self.provider.clone());
        let decimals: u8 = self
            .bounded("decimals", erc20.decimals().call())
            .await
            .with_context(|| format!("decimals on {token_address}"))?;
        Ok(u32::from(decimals))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
