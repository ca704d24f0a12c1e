//! Take-profit engine.
//!
//! Values each open position through the aggregator, compares the multiple
//! on capital against the tier ladder and sells at most one tier per
//! position per cycle. A tier lands in the sell history only after its swap
//! succeeded, so a failed or skipped sell is simply retried next cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::chain::{BalanceSource, SwapExecutor};
use crate::quote::QuoteClient;
use crate::storage::PositionStore;
use crate::types::{Asset, Position, ProfitTier, SellRecord, TierLadder};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// What one evaluation did to a position.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Token balance is zero; the position should be dropped.
    Closed,
    /// Nothing to do this cycle (no tier reached, or no valuation).
    None,
    /// A tier fired and its swap succeeded.
    Sell { tier: ProfitTier, record: SellRecord },
    /// A tier fired but the swap could not be quoted or executed.
    SellFailed { tier: ProfitTier, reason: String },
}

/// Summary of one pass over every open position.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub evaluated: usize,
    pub sells: usize,
    pub failed_sells: usize,
    /// Symbols removed because their balance reached zero.
    pub closed: Vec<String>,
    pub actions: Vec<(String, Action)>,
    /// The pass stopped early because of cancellation.
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

impl Default for CycleReport {
    fn default() -> Self {
        Self {
            evaluated: 0,
            sells: 0,
            failed_sells: 0,
            closed: Vec::new(),
            actions: Vec::new(),
            cancelled: false,
            timestamp: Utc::now(),
        }
    }
}

impl CycleReport {
    /// True when the pass changed any position.
    pub fn mutated(&self) -> bool {
        self.sells > 0 || !self.closed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ProfitEngine {
    quotes: Arc<QuoteClient>,
    balances: Arc<dyn BalanceSource>,
    executor: Arc<dyn SwapExecutor>,
    ladder: TierLadder,
    slippage: Decimal,
    native: Asset,
    span: Span,
}

impl ProfitEngine {
    pub fn new(
        quotes: Arc<QuoteClient>,
        balances: Arc<dyn BalanceSource>,
        executor: Arc<dyn SwapExecutor>,
        ladder: TierLadder,
        slippage: Decimal,
        native: Asset,
    ) -> Self {
        Self {
            quotes,
            balances,
            executor,
            ladder,
            slippage,
            native,
            span: Span::none(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn ladder(&self) -> &TierLadder {
        &self.ladder
    }

    /// Evaluate one position, mutating it in place on a successful sell.
    pub async fn evaluate(&self, position: &mut Position, cancel: &CancellationToken) -> Action {
        self.evaluate_inner(position, cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn evaluate_inner(&self, position: &mut Position, cancel: &CancellationToken) -> Action {
        let token = position.asset();

        let balance = match self.balances.token_balance(&token).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(symbol = %position.symbol, error = %e, "Balance query failed, skipping");
                return Action::None;
            }
        };

        if balance <= Decimal::ZERO {
            info!(symbol = %position.symbol, "Balance is zero, position closed");
            return Action::Closed;
        }
        position.current_balance = balance;

        let Some(quote) = self
            .quotes
            .get_quote(&token, &self.native, balance, self.slippage, true, cancel)
            .await
        else {
            debug!(symbol = %position.symbol, "No valuation this cycle");
            return Action::None;
        };

        let valuation = quote.estimated_output;
        let Some(multiple) = position.multiple_for(valuation) else {
            warn!(
                symbol = %position.symbol,
                %valuation,
                capital = %position.capital,
                "Multiple out of range, no valuation this cycle"
            );
            return Action::None;
        };
        info!(
            symbol = %position.symbol,
            %balance,
            %valuation,
            multiple = %multiple.round_dp(2),
            "Position valued"
        );

        let executed = position.executed_multipliers();
        let Some(tier) = self.ladder.select(multiple, &executed).cloned() else {
            return Action::None;
        };

        let sell_amount = balance * tier.sell_fraction;
        info!(
            symbol = %position.symbol,
            tier = %tier,
            amount = %sell_amount,
            "Take-profit tier reached, selling"
        );

        // Fresh quote: the swap must not be built from a cached route.
        let Some(sell_quote) = self
            .quotes
            .get_quote(&token, &self.native, sell_amount, self.slippage, false, cancel)
            .await
        else {
            warn!(symbol = %position.symbol, tier = %tier, "No sell quote, tier stays eligible");
            return Action::SellFailed {
                tier,
                reason: "no sell quote available".into(),
            };
        };

        match self.executor.execute(&sell_quote).await {
            Ok(receipt) => {
                let record = SellRecord {
                    multiplier: tier.multiplier,
                    amount: sell_amount,
                    tx_ref: receipt.tx_ref,
                    executed_at: Utc::now(),
                    valuation,
                    multiple,
                };
                position.record_sell(record.clone());
                position.current_balance = balance - sell_amount;
                info!(
                    symbol = %position.symbol,
                    tier = %tier,
                    tx = %record.tx_ref,
                    received = %sell_quote.estimated_output,
                    "Sell executed"
                );
                Action::Sell { tier, record }
            }
            Err(e) => {
                warn!(symbol = %position.symbol, tier = %tier, error = %e, "Sell failed, tier stays eligible");
                Action::SellFailed {
                    tier,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Evaluate every position in insertion order, dropping closed ones.
    pub async fn evaluate_all_positions(
        &self,
        store: &mut PositionStore,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let mut report = CycleReport::default();

        for symbol in store.symbols() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(position) = store.get_mut(&symbol) else {
                continue;
            };

            let action = self
                .evaluate(position, cancel)
                .instrument(info_span!("position", symbol = %symbol))
                .await;
            report.evaluated += 1;

            match &action {
                Action::Closed => {
                    store.remove_position(&symbol);
                    report.closed.push(symbol.clone());
                }
                Action::Sell { .. } => report.sells += 1,
                Action::SellFailed { .. } => report.failed_sells += 1,
                Action::None => {}
            }
            report.actions.push((symbol, action));
        }

        if cancel.is_cancelled() {
            report.cancelled = true;
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
