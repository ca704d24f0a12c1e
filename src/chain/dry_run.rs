//! Swap executor that never touches the chain.
//!
//! Logs what would be sent and hands back a synthetic receipt, so the whole
//! monitor/sell path can run against live quotes without a signer.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::{ExecutionReceipt, SwapExecutor};
use crate::types::Quote;

#[derive(Debug, Default)]
pub struct DryRunExecutor {
    executed: AtomicU64,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps "executed" so far.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SwapExecutor for DryRunExecutor {
    async fn execute(&self, quote: &Quote) -> Result<ExecutionReceipt> {
        let target = quote
            .transaction
            .as_ref()
            .map(|tx| tx.to.as_str())
            .unwrap_or("none");
        info!(
            from = %quote.from,
            to = %quote.to,
            amount = %quote.amount,
            expected = %quote.estimated_output,
            venues = %quote.venues().join(", "),
            target,
            "[DRY RUN] Would execute swap"
        );
        self.executed.fetch_add(1, Ordering::Relaxed);
        Ok(ExecutionReceipt {
            tx_ref: format!("dry-run-{}", uuid::Uuid::new_v4()),
            gas_used: None,
        })
    }
}
