//! Buy path.
//!
//! Spends native currency on a token and records the result as a new open
//! position. Optionally polls until the aggregator can route the token at
//! all, which is the usual state right after a launch.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument, Span};

use crate::chain::{BalanceSource, SwapExecutor};
use crate::quote::QuoteClient;
use crate::storage::PositionStore;
use crate::types::{Asset, HunterError, Position, DEFAULT_DECIMALS};

#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub symbol: String,
    pub token_address: String,
    /// Native currency to spend.
    pub capital: Decimal,
    pub slippage: Decimal,
    /// Poll interval while no route exists; `None` fails immediately.
    pub wait: Option<Duration>,
}

pub struct Acquirer {
    quotes: Arc<QuoteClient>,
    balances: Arc<dyn BalanceSource>,
    executor: Arc<dyn SwapExecutor>,
    native: Asset,
    max_positions: usize,
    span: Span,
}

impl Acquirer {
    pub fn new(
        quotes: Arc<QuoteClient>,
        balances: Arc<dyn BalanceSource>,
        executor: Arc<dyn SwapExecutor>,
        native: Asset,
        max_positions: usize,
    ) -> Self {
        Self {
            quotes,
            balances,
            executor,
            native,
            max_positions,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Buy `request.capital` worth of the token and add it to `store`.
    ///
    /// Domain failures come back as `HunterError` inside the `anyhow` error.
    pub async fn acquire(
        &self,
        store: &mut PositionStore,
        request: AcquireRequest,
        cancel: &CancellationToken,
    ) -> Result<Position> {
        self.acquire_inner(store, request, cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn acquire_inner(
        &self,
        store: &mut PositionStore,
        request: AcquireRequest,
        cancel: &CancellationToken,
    ) -> Result<Position> {
        if store.contains(&request.symbol) {
            return Err(HunterError::DuplicatePosition(request.symbol).into());
        }
        if store.len() >= self.max_positions {
            return Err(HunterError::PositionLimit(store.len()).into());
        }

        let available = self
            .balances
            .native_balance()
            .await
            .context("Failed to read native balance")?;
        if available < request.capital {
            return Err(HunterError::InsufficientBalance {
                needed: request.capital,
                available,
            }
            .into());
        }

        let decimals = match self.balances.token_decimals(&request.token_address).await {
            Ok(d) => d,
            Err(e) => {
                warn!(token = %request.token_address, error = %e, "decimals() failed, assuming {DEFAULT_DECIMALS}");
                DEFAULT_DECIMALS
            }
        };
        let token = Asset::new(request.token_address.clone(), decimals);

        info!(
            symbol = %request.symbol,
            token = %token,
            capital = %request.capital,
            "Acquiring position"
        );

        let quote = loop {
            if let Some(q) = self
                .quotes
                .get_quote(&self.native, &token, request.capital, request.slippage, false, cancel)
                .await
            {
                break q;
            }
            if cancel.is_cancelled() {
                return Err(HunterError::Cancelled.into());
            }
            let Some(interval) = request.wait else {
                return Err(HunterError::NoLiquidity(request.symbol).into());
            };

            info!(symbol = %request.symbol, wait_secs = interval.as_secs(), "No route yet, waiting for liquidity");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HunterError::Cancelled.into()),
                _ = sleep(interval) => {}
            }
        };

        info!(expected = %quote.estimated_output, venues = %quote.venues().join(", "), "Buy quote received");

        let receipt = self
            .executor
            .execute(&quote)
            .await
            .map_err(|e| HunterError::Execution(e.to_string()))?;

        let balance = match self.balances.token_balance(&token).await {
            Ok(b) if b > Decimal::ZERO => b,
            Ok(_) | Err(_) => {
                warn!(
                    symbol = %request.symbol,
                    estimate = %quote.estimated_output,
                    "Could not read acquired balance, using quoted output"
                );
                quote.estimated_output
            }
        };

        let position = Position::new(
            request.symbol,
            request.token_address,
            decimals,
            balance,
            request.capital,
            receipt.tx_ref,
        );
        store.insert(position.clone())?;

        info!(
            symbol = %position.symbol,
            balance = %position.current_balance,
            tx = %position.acquisition_tx,
            "Position opened"
        );
        Ok(position)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
