//! Swap-quote aggregator integration.
//!
//! Defines the `QuoteSource` trait (one raw quote request, no retries or
//! rate limiting) and the LI.FI implementation behind it.

pub mod lifi;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

/// One quote request with amounts already in smallest units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: String,
    pub to_token: String,
    /// Input amount in the source token's smallest unit.
    pub from_amount: u128,
    pub from_address: String,
    /// Slippage tolerance as a fraction (0.15 = 15%).
    pub slippage: Decimal,
}

// ---------------------------------------------------------------------------
// Wire types (aggregator JSON → Rust)
// ---------------------------------------------------------------------------

/// The subset of the `/quote` response the engine reads. Every field is
/// optional on the wire; a missing estimate is detected by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(default)]
    pub estimate: Option<QuoteEstimate>,
    #[serde(default)]
    pub included_steps: Vec<IncludedStep>,
    #[serde(default)]
    pub transaction_request: Option<WireTransactionRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEstimate {
    /// Output amount in the destination token's smallest unit.
    #[serde(default)]
    pub to_amount: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedStep {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub tool_details: Option<ToolDetails>,
}

impl IncludedStep {
    /// Venue display name, falling back to the tool key.
    pub fn venue(&self) -> String {
        self.tool_details
            .as_ref()
            .and_then(|d| d.name.clone())
            .or_else(|| self.tool.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolDetails {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransactionRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub gas_limit: Option<String>,
    #[serde(default)]
    pub gas_price: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single quote attempt failed. All variants are retried by the
/// quote client; the split only drives logging.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("Rate limited by aggregator (HTTP 429)")]
    Throttled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Aggregator HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed quote response: {0}")]
    Malformed(String),
}

impl AggregatorError {
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::Throttled)
    }
}

/// Abstraction over quote aggregators.
///
/// Implementors perform exactly one request per call. Retries, rate limiting
/// and caching belong to `QuoteClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, AggregatorError>;
}
