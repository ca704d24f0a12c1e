//! Shared types for the Alpha Hunter engine.
//!
//! Assets, quotes, the take-profit ladder and persisted positions. Every
//! other module depends on these, so they carry no behaviour beyond simple
//! invariants and formatting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Address the aggregator uses for the chain's native currency.
pub const NATIVE_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Decimal places assumed when nothing better is known (BNB and most BEP-20s).
pub const DEFAULT_DECIMALS: u32 = 18;

/// A token (or the native currency) as the aggregator sees it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub address: String,
    pub decimals: u32,
}

impl Asset {
    pub fn new(address: impl Into<String>, decimals: u32) -> Self {
        Self {
            address: address.into(),
            decimals,
        }
    }

    /// The chain's native currency.
    pub fn native(decimals: u32) -> Self {
        Self::new(NATIVE_ADDRESS, decimals)
    }

    pub fn is_native(&self) -> bool {
        self.address.eq_ignore_ascii_case(NATIVE_ADDRESS)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "native")
        } else {
            write!(f, "{}", self.address)
        }
    }
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// One hop of an aggregator route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    /// Liquidity venue (DEX) the hop goes through.
    pub venue: String,
}

/// Raw swap transaction parameters returned alongside a quote.
/// Numeric fields stay hex strings exactly as the aggregator sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: String,
    pub data: String,
    pub value: Option<String>,
    pub gas_limit: Option<String>,
    pub gas_price: Option<String>,
}

/// A priced swap from the aggregator. Built only by `QuoteClient`.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub from: Asset,
    pub to: Asset,
    /// Requested input, in `from` units.
    pub amount: Decimal,
    /// Estimated output, in `to` units.
    pub estimated_output: Decimal,
    pub steps: Vec<RouteStep>,
    pub transaction: Option<TransactionRequest>,
}

impl Quote {
    /// Names of the venues the route passes through, in order.
    pub fn venues(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.venue.as_str()).collect()
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} {} via [{}]",
            self.amount,
            self.from,
            self.estimated_output,
            self.to,
            self.venues().join(", "),
        )
    }
}

// ---------------------------------------------------------------------------
// Take-profit ladder
// ---------------------------------------------------------------------------

/// Sell `sell_fraction` of the remaining balance once the position is worth
/// `multiplier` times its capital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitTier {
    pub multiplier: Decimal,
    pub sell_fraction: Decimal,
    #[serde(default)]
    pub label: String,
}

impl ProfitTier {
    pub fn new(multiplier: Decimal, sell_fraction: Decimal) -> Self {
        Self {
            multiplier,
            sell_fraction,
            label: format!("{multiplier}x sell {}%", sell_fraction * Decimal::ONE_HUNDRED),
        }
    }
}

impl fmt::Display for ProfitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "{}x ({}%)", self.multiplier, self.sell_fraction * Decimal::ONE_HUNDRED)
        } else {
            write!(f, "{}", self.label)
        }
    }
}

/// Validated, strictly increasing list of profit tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct TierLadder {
    tiers: Vec<ProfitTier>,
}

impl TierLadder {
    /// Build a ladder, rejecting empty, non-monotonic or out-of-range tiers.
    pub fn new(tiers: Vec<ProfitTier>) -> Result<Self, HunterError> {
        if tiers.is_empty() {
            return Err(HunterError::InvalidLadder("ladder has no tiers".into()));
        }
        for tier in &tiers {
            if tier.multiplier <= Decimal::ZERO {
                return Err(HunterError::InvalidLadder(format!(
                    "multiplier {} must be positive",
                    tier.multiplier
                )));
            }
            if tier.sell_fraction <= Decimal::ZERO || tier.sell_fraction > Decimal::ONE {
                return Err(HunterError::InvalidLadder(format!(
                    "sell fraction {} of tier {}x must be in (0, 1]",
                    tier.sell_fraction, tier.multiplier
                )));
            }
        }
        if let Some(pair) = tiers.windows(2).find(|w| w[1].multiplier <= w[0].multiplier) {
            return Err(HunterError::InvalidLadder(format!(
                "multipliers must be strictly increasing ({}x followed by {}x)",
                pair[0].multiplier, pair[1].multiplier
            )));
        }
        Ok(Self { tiers })
    }

    /// 2x sells half (recovers capital), then 10% / 20% / 20% at 3x / 5x / 10x.
    pub fn default_tiers() -> Vec<ProfitTier> {
        use rust_decimal_macros::dec;
        vec![
            ProfitTier { multiplier: dec!(2.0), sell_fraction: dec!(0.5), label: "2x recover capital".into() },
            ProfitTier { multiplier: dec!(3.0), sell_fraction: dec!(0.1), label: "3x sell 10%".into() },
            ProfitTier { multiplier: dec!(5.0), sell_fraction: dec!(0.2), label: "5x sell 20%".into() },
            ProfitTier { multiplier: dec!(10.0), sell_fraction: dec!(0.2), label: "10x sell 20%".into() },
        ]
    }

    pub fn tiers(&self) -> &[ProfitTier] {
        &self.tiers
    }

    pub fn contains(&self, multiplier: Decimal) -> bool {
        self.tiers.iter().any(|t| t.multiplier == multiplier)
    }

    /// Highest tier reached by `multiple` that is not in `executed`.
    ///
    /// Scans from the top so a position that jumped several tiers in one
    /// cycle catches up to the best one instead of walking the ladder.
    pub fn select(&self, multiple: Decimal, executed: &[Decimal]) -> Option<&ProfitTier> {
        self.tiers
            .iter()
            .rev()
            .find(|t| t.multiplier <= multiple && !executed.contains(&t.multiplier))
    }
}

impl Default for TierLadder {
    fn default() -> Self {
        Self {
            tiers: Self::default_tiers(),
        }
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

fn default_decimals() -> u32 {
    DEFAULT_DECIMALS
}

/// Accepts RFC 3339 as well as the naive ISO timestamps older state files
/// contain; naive values are taken as UTC.
mod lenient_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Ok(dt.with_timezone(&Utc)),
            Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()),
        }
    }
}

/// One executed take-profit sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellRecord {
    /// Ladder multiplier that triggered the sale.
    pub multiplier: Decimal,
    /// Tokens sold.
    pub amount: Decimal,
    #[serde(alias = "tx", default)]
    pub tx_ref: String,
    #[serde(
        alias = "time",
        default = "Utc::now",
        deserialize_with = "lenient_timestamp::deserialize"
    )]
    pub executed_at: DateTime<Utc>,
    /// Position value in native units when the tier fired.
    #[serde(alias = "bnb_value", default)]
    pub valuation: Decimal,
    /// Realized multiple (valuation / capital).
    #[serde(alias = "profit_mult", default)]
    pub multiple: Decimal,
}

/// An open token position.
///
/// The sell history is append-only and holds each multiplier at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Display key; filled from the map key when loaded from disk.
    #[serde(default)]
    pub symbol: String,
    #[serde(alias = "address")]
    pub token_address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(alias = "initial_balance", default)]
    pub amount_acquired: Decimal,
    #[serde(default)]
    pub current_balance: Decimal,
    #[serde(alias = "buy_tx", default)]
    pub acquisition_tx: String,
    #[serde(
        alias = "buy_time",
        default = "Utc::now",
        deserialize_with = "lenient_timestamp::deserialize"
    )]
    pub acquired_at: DateTime<Utc>,
    /// Native currency committed at open.
    #[serde(alias = "investment_bnb", default)]
    pub capital: Decimal,
    #[serde(alias = "sold_history", default)]
    pub sell_history: Vec<SellRecord>,
}

impl Position {
    pub fn new(
        symbol: impl Into<String>,
        token_address: impl Into<String>,
        decimals: u32,
        balance: Decimal,
        capital: Decimal,
        acquisition_tx: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            token_address: token_address.into(),
            decimals,
            amount_acquired: balance,
            current_balance: balance,
            acquisition_tx: acquisition_tx.into(),
            acquired_at: Utc::now(),
            capital,
            sell_history: Vec::new(),
        }
    }

    /// The token as a quotable asset.
    pub fn asset(&self) -> Asset {
        Asset::new(self.token_address.clone(), self.decimals)
    }

    /// Multipliers already sold at, including any no longer on the ladder.
    pub fn executed_multipliers(&self) -> Vec<Decimal> {
        self.sell_history.iter().map(|r| r.multiplier).collect()
    }

    pub fn has_executed(&self, multiplier: Decimal) -> bool {
        self.sell_history.iter().any(|r| r.multiplier == multiplier)
    }

    /// Append a sale. Returns `false` (and records nothing) when the
    /// multiplier is already in the history.
    pub fn record_sell(&mut self, record: SellRecord) -> bool {
        if self.has_executed(record.multiplier) {
            return false;
        }
        self.sell_history.push(record);
        true
    }

    /// Value / capital, treating zero capital as 1.0. `None` when the
    /// quotient does not fit in a `Decimal`.
    pub fn multiple_for(&self, valuation: Decimal) -> Option<Decimal> {
        if self.capital.is_zero() {
            Some(Decimal::ONE)
        } else {
            valuation.checked_div(self.capital)
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiers: Vec<String> = self
            .sell_history
            .iter()
            .map(|r| format!("{}x", r.multiplier))
            .collect();
        write!(
            f,
            "{} [{}] balance={} capital={} sold=[{}]",
            self.symbol,
            self.token_address,
            self.current_balance,
            self.capital,
            tiers.join(", "),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors for the hunter. Transport failures have their own type in
/// `aggregator` and never escape the quote client.
#[derive(Debug, thiserror::Error)]
pub enum HunterError {
    #[error("Invalid tier ladder: {0}")]
    InvalidLadder(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("No liquidity: no quote available for {0}")]
    NoLiquidity(String),

    #[error("Position already open: {0}")]
    DuplicatePosition(String),

    #[error("Position limit reached ({0} open)")]
    PositionLimit(usize),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Amount conversion failed: {0}")]
    Units(String),

    #[error("Operation cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
