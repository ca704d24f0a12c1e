//! Quote acquisition.
//!
//! `QuoteClient` wraps a `QuoteSource` with the shared rate limiter, an
//! optional TTL cache and a bounded retry loop. Every failure mode of the
//! aggregator collapses into `None` ("unavailable"); callers never see
//! transport errors.

pub mod cache;
pub mod rate_limiter;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use crate::aggregator::{AggregatorError, QuoteRequest, QuoteResponse, QuoteSource};
use crate::types::{Asset, Quote, RouteStep, TransactionRequest};
use crate::units::{from_base_units, to_base_units};

use self::cache::{cache_key, KeyPrecision, QuoteCache};
use self::rate_limiter::{backoff_for, RateLimiter};

/// Attempts per `get_quote` call.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct QuoteClientConfig {
    pub chain_id: u64,
    /// Wallet the quoted transaction is built for.
    pub from_address: String,
    pub max_retries: u32,
    /// Cap on the sleep between attempts.
    pub retry_cap: Duration,
    pub key_precision: KeyPrecision,
}

impl Default for QuoteClientConfig {
    fn default() -> Self {
        Self {
            chain_id: 56,
            from_address: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_cap: Duration::from_secs(60),
            key_precision: KeyPrecision::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct QuoteClient {
    source: Arc<dyn QuoteSource>,
    limiter: Arc<RateLimiter>,
    cache: Option<Arc<QuoteCache>>,
    config: QuoteClientConfig,
    span: Span,
}

impl QuoteClient {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        limiter: Arc<RateLimiter>,
        cache: Option<Arc<QuoteCache>>,
        config: QuoteClientConfig,
    ) -> Self {
        Self {
            source,
            limiter,
            cache,
            config,
            span: Span::none(),
        }
    }

    /// Run every quote request inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Quote `amount` of `from` into `to`.
    ///
    /// Returns `None` when every attempt failed or `cancel` fired. With
    /// `use_cache` a fresh cached quote is returned without consuming rate
    /// limit budget.
    pub async fn get_quote(
        &self,
        from: &Asset,
        to: &Asset,
        amount: Decimal,
        slippage: Decimal,
        use_cache: bool,
        cancel: &CancellationToken,
    ) -> Option<Quote> {
        self.fetch(from, to, amount, slippage, use_cache, cancel)
            .instrument(self.span.clone())
            .await
    }

    async fn fetch(
        &self,
        from: &Asset,
        to: &Asset,
        amount: Decimal,
        slippage: Decimal,
        use_cache: bool,
        cancel: &CancellationToken,
    ) -> Option<Quote> {
        let cache = if use_cache { self.cache.as_deref() } else { None };
        let key = cache.map(|_| cache_key(from, to, amount, slippage, self.config.key_precision));

        if let (Some(cache), Some(key)) = (cache, key.as_deref()) {
            if let Some(quote) = cache.get(key) {
                debug!(from = %from, to = %to, %amount, "Using cached quote");
                return Some(quote);
            }
        }

        let from_amount = match to_base_units(amount, from.decimals) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(from = %from, %amount, error = %e, "Cannot convert quote amount");
                return None;
            }
        };

        let request = QuoteRequest {
            from_chain: self.config.chain_id,
            to_chain: self.config.chain_id,
            from_token: from.address.clone(),
            to_token: to.address.clone(),
            from_amount,
            from_address: self.config.from_address.clone(),
            slippage,
        };

        let attempts = self.config.max_retries.max(1);
        for attempt in 1..=attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Quote request cancelled while rate limited");
                    return None;
                }
                _ = self.limiter.acquire() => {}
            }

            debug!(attempt, attempts, from = %from, to = %to, %amount, "Requesting quote");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Quote request cancelled in flight");
                    return None;
                }
                result = self.source.fetch_quote(&request) => result,
            };

            match outcome.and_then(|resp| build_quote(resp, from, to, amount)) {
                Ok(quote) => {
                    self.limiter.record_success().await;
                    if let (Some(cache), Some(key)) = (cache, key) {
                        cache.set(key, quote.clone());
                    }

                    let stats = self.limiter.stats().await;
                    info!(
                        output = %quote.estimated_output,
                        venues = %quote.venues().join(", "),
                        minute = format!("{}/{}", stats.minute_requests, stats.minute_limit),
                        hour = format!("{}/{}", stats.hour_requests, stats.hour_limit),
                        "Quote received"
                    );
                    return Some(quote);
                }
                Err(e) => {
                    self.limiter.record_failure().await;
                    if e.is_throttle() {
                        warn!(attempt, attempts, "Aggregator throttled the request");
                    } else {
                        warn!(attempt, attempts, error = %e, "Quote attempt failed");
                    }

                    if attempt < attempts {
                        let wait = backoff_for(attempt, self.config.retry_cap);
                        debug!(wait_secs = wait.as_secs(), "Waiting before retry");
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                info!("Quote retry cancelled");
                                return None;
                            }
                            _ = sleep(wait) => {}
                        }
                    }
                }
            }
        }

        warn!(attempts, from = %from, to = %to, %amount, "Quote unavailable");
        None
    }
}

/// Turn a wire response into a `Quote`, rejecting responses without a
/// usable output estimate.
fn build_quote(
    resp: QuoteResponse,
    from: &Asset,
    to: &Asset,
    amount: Decimal,
) -> Result<Quote, AggregatorError> {
    let raw = resp
        .estimate
        .and_then(|e| e.to_amount)
        .ok_or_else(|| AggregatorError::Malformed("response has no estimate".into()))?;
    let estimated_output =
        from_base_units(&raw, to.decimals).map_err(|e| AggregatorError::Malformed(e.to_string()))?;

    let steps = resp
        .included_steps
        .iter()
        .map(|s| RouteStep { venue: s.venue() })
        .collect();

    let transaction = resp.transaction_request.and_then(|tx| {
        Some(TransactionRequest {
            to: tx.to?,
            data: tx.data?,
            value: tx.value,
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
        })
    });

    Ok(Quote {
        from: from.clone(),
        to: to.clone(),
        amount,
        estimated_output,
        steps,
        transaction,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
