//! Time-bounded quote cache.
//!
//! Keys are derived from (from, to, amount, slippage). Amount and slippage
//! are rounded and normalized first so that `0.1`, `0.10` and
//! `0.1000000001` land on the same entry.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::types::{Asset, Quote};

/// Default entry lifetime.
pub const DEFAULT_TTL_SECS: u64 = 15;

/// Rounding applied before key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPrecision {
    pub amount_decimals: u32,
    pub slippage_decimals: u32,
}

impl Default for KeyPrecision {
    fn default() -> Self {
        Self {
            amount_decimals: 8,
            slippage_decimals: 4,
        }
    }
}

/// Deterministic cache key for a quote request.
pub fn cache_key(
    from: &Asset,
    to: &Asset,
    amount: Decimal,
    slippage: Decimal,
    precision: KeyPrecision,
) -> String {
    format!(
        "{}_{}_{}_{}",
        from.address.to_ascii_lowercase(),
        to.address.to_ascii_lowercase(),
        amount.round_dp(precision.amount_decimals).normalize(),
        slippage.round_dp(precision.slippage_decimals).normalize(),
    )
}

struct CacheEntry {
    quote: Quote,
    inserted_at: Instant,
}

/// In-memory TTL cache. All operations take one lock and never await.
pub struct QuoteCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        info!(ttl_secs = ttl.as_secs(), "Quote cache initialised");
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Unexpired quote for `key`; an expired entry is evicted.
    pub fn get(&self, key: &str) -> Option<Quote> {
        let mut entries = self.lock();
        let fresh = match entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() < self.ttl,
            None => return None,
        };
        if fresh {
            debug!(key, "Quote cache hit");
            entries.get(key).map(|e| e.quote.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    /// Store `quote`, replacing any previous entry for `key`.
    pub fn set(&self, key: impl Into<String>, quote: Quote) {
        let key = key.into();
        debug!(key = %key, "Caching quote");
        self.lock().insert(
            key,
            CacheEntry {
                quote,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&self) {
        self.lock().clear();
        info!("Quote cache cleared");
    }

    /// Number of stored entries, expired ones included until looked up.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
