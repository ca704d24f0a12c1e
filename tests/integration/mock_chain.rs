//! In-memory market for integration testing.
//!
//! One token priced in native currency, one wallet, and an aggregator that
//! quotes at the current price. Implements `QuoteSource`, `BalanceSource`
//! and `SwapExecutor` so the whole engine runs with no network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

use alpha_hunter::aggregator::{
    AggregatorError, IncludedStep, QuoteEstimate, QuoteRequest, QuoteResponse, QuoteSource, ToolDetails,
    WireTransactionRequest,
};
use alpha_hunter::chain::{BalanceSource, ExecutionReceipt, SwapExecutor};
use alpha_hunter::types::{Asset, Quote, NATIVE_ADDRESS};
use alpha_hunter::units::{from_base_units, to_base_units};

pub const TOKEN: &str = "0x25d887ce7a35172c62febfd67a1856f20faebb00";
pub const TOKEN_DECIMALS: u32 = 18;

#[derive(Debug)]
struct MarketState {
    /// Native currency per token.
    price: Decimal,
    native_balance: Decimal,
    token_balance: Decimal,
    /// Remaining quote requests to answer with HTTP 429.
    throttle_next: usize,
    /// Quote without any route (fresh launch).
    no_route: bool,
    fail_execution: Option<String>,
    quote_requests: usize,
    executed: Vec<Quote>,
}

/// A deterministic single-token market.
///
/// Cheap to clone; clones share state, so one handle can be given to the
/// engine while the test keeps another to move the price.
#[derive(Clone)]
pub struct MockMarket {
    state: Arc<Mutex<MarketState>>,
}

impl MockMarket {
    pub fn new(price: Decimal, native_balance: Decimal) -> Self {
        Self {
            state: Arc::new(Mutex::new(MarketState {
                price,
                native_balance,
                token_balance: Decimal::ZERO,
                throttle_next: 0,
                no_route: false,
                fail_execution: None,
                quote_requests: 0,
                executed: Vec::new(),
            })),
        }
    }

    pub fn set_price(&self, price: Decimal) {
        self.state.lock().unwrap().price = price;
    }

    pub fn set_token_balance(&self, balance: Decimal) {
        self.state.lock().unwrap().token_balance = balance;
    }

    pub fn token_balance_now(&self) -> Decimal {
        self.state.lock().unwrap().token_balance
    }

    pub fn native_balance_now(&self) -> Decimal {
        self.state.lock().unwrap().native_balance
    }

    /// Answer the next `n` quote requests with a throttle.
    pub fn throttle(&self, n: usize) {
        self.state.lock().unwrap().throttle_next = n;
    }

    pub fn set_no_route(&self, no_route: bool) {
        self.state.lock().unwrap().no_route = no_route;
    }

    /// Force all subsequent executions to fail.
    pub fn set_execution_error(&self, msg: &str) {
        self.state.lock().unwrap().fail_execution = Some(msg.to_string());
    }

    pub fn clear_execution_error(&self) {
        self.state.lock().unwrap().fail_execution = None;
    }

    pub fn quote_requests(&self) -> usize {
        self.state.lock().unwrap().quote_requests
    }

    pub fn executed(&self) -> Vec<Quote> {
        self.state.lock().unwrap().executed.clone()
    }
}

#[async_trait]
impl QuoteSource for MockMarket {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, AggregatorError> {
        let mut state = self.state.lock().unwrap();
        state.quote_requests += 1;

        if state.throttle_next > 0 {
            state.throttle_next -= 1;
            return Err(AggregatorError::Throttled);
        }
        if state.no_route {
            return Err(AggregatorError::Http {
                status: 404,
                body: "No available quotes for the requested transfer".into(),
            });
        }

        let buying = request.from_token == NATIVE_ADDRESS;
        let input = from_base_units(&request.from_amount.to_string(), 18)
            .map_err(|e| AggregatorError::Malformed(e.to_string()))?;
        let output = if buying {
            input / state.price
        } else {
            input * state.price
        };
        let raw = to_base_units(output, 18).map_err(|e| AggregatorError::Malformed(e.to_string()))?;

        Ok(QuoteResponse {
            estimate: Some(QuoteEstimate {
                to_amount: Some(raw.to_string()),
            }),
            included_steps: vec![IncludedStep {
                tool: Some("pancakeswap".into()),
                tool_details: Some(ToolDetails {
                    name: Some("PancakeSwap".into()),
                }),
            }],
            transaction_request: Some(WireTransactionRequest {
                to: Some("0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae".into()),
                data: Some("0x4630a0d8".into()),
                value: Some(if buying { format!("0x{:x}", request.from_amount) } else { "0x0".into() }),
                gas_limit: Some("0x7a120".into()),
                gas_price: Some("0x3b9aca00".into()),
            }),
        })
    }
}

#[async_trait]
impl BalanceSource for MockMarket {
    async fn native_balance(&self) -> Result<Decimal> {
        Ok(self.state.lock().unwrap().native_balance)
    }

    async fn token_balance(&self, token: &Asset) -> Result<Decimal> {
        if !token.address.eq_ignore_ascii_case(TOKEN) {
            return Err(anyhow!("unknown token {}", token.address));
        }
        Ok(self.state.lock().unwrap().token_balance)
    }

    async fn token_decimals(&self, _token_address: &str) -> Result<u32> {
        Ok(TOKEN_DECIMALS)
    }
}

#[async_trait]
impl SwapExecutor for MockMarket {
    async fn execute(&self, quote: &Quote) -> Result<ExecutionReceipt> {
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = &state.fail_execution {
            return Err(anyhow!("{msg}"));
        }

        if quote.from.is_native() {
            if quote.amount > state.native_balance {
                return Err(anyhow!("insufficient funds for swap"));
            }
            state.native_balance -= quote.amount;
            state.token_balance += quote.estimated_output;
        } else {
            if quote.amount > state.token_balance {
                return Err(anyhow!("transfer amount exceeds balance"));
            }
            state.token_balance -= quote.amount;
            state.native_balance += quote.estimated_output;
        }

        state.executed.push(quote.clone());
        Ok(ExecutionReceipt {
            tx_ref: format!("0xmock{:04}", state.executed.len()),
            gas_used: Some(180_000),
        })
    }
}
