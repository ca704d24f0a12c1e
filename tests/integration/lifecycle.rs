//! End-to-end position lifecycle against the in-memory market.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use alpha_hunter::engine::acquire::{AcquireRequest, Acquirer};
use alpha_hunter::engine::monitor::{MonitorExit, MonitorLoop};
use alpha_hunter::engine::profit::{Action, ProfitEngine};
use alpha_hunter::quote::cache::QuoteCache;
use alpha_hunter::quote::rate_limiter::{RateLimiter, RateLimiterConfig};
use alpha_hunter::quote::{QuoteClient, QuoteClientConfig};
use alpha_hunter::storage::{JsonFileRepository, PositionRepository, PositionStore};
use alpha_hunter::types::{Asset, HunterError, TierLadder};

use crate::mock_chain::{MockMarket, TOKEN};

struct Harness {
    market: MockMarket,
    quotes: Arc<QuoteClient>,
    engine: Arc<ProfitEngine>,
    acquirer: Acquirer,
    repo: Arc<JsonFileRepository>,
}

impl Harness {
    /// Token at 0.00005 native, wallet with 1 native.
    fn new() -> Self {
        let market = MockMarket::new(dec!(0.00005), dec!(1));
        let limiter = RateLimiter::new(RateLimiterConfig::default()).unwrap();
        let quotes = Arc::new(QuoteClient::new(
            Arc::new(market.clone()),
            Arc::new(limiter),
            Some(Arc::new(QuoteCache::default())),
            QuoteClientConfig {
                from_address: "0x000000000000000000000000000000000000dEaD".into(),
                ..QuoteClientConfig::default()
            },
        ));
        let engine = Arc::new(ProfitEngine::new(
            Arc::clone(&quotes),
            Arc::new(market.clone()),
            Arc::new(market.clone()),
            TierLadder::default(),
            dec!(0.15),
            Asset::native(18),
        ));
        let acquirer = Acquirer::new(
            Arc::clone(&quotes),
            Arc::new(market.clone()),
            Arc::new(market.clone()),
            Asset::native(18),
            5,
        );

        let mut path = std::env::temp_dir();
        path.push(format!("alpha_hunter_it_{}.json", uuid::Uuid::new_v4()));

        Self {
            market,
            quotes,
            engine,
            acquirer,
            repo: Arc::new(JsonFileRepository::new(path)),
        }
    }

    fn monitor(&self, interval_secs: u64) -> MonitorLoop {
        let repo: Arc<dyn PositionRepository> = self.repo.clone();
        MonitorLoop::new(Arc::clone(&self.engine), repo, Duration::from_secs(interval_secs))
    }

    async fn buy(&self, store: &mut PositionStore, symbol: &str) {
        let request = AcquireRequest {
            symbol: symbol.into(),
            token_address: TOKEN.into(),
            capital: dec!(0.05),
            slippage: dec!(0.15),
            wait: None,
        };
        self.acquirer
            .acquire(store, request, &CancellationToken::new())
            .await
            .unwrap();
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.repo.delete();
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle_with_take_profit() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let mut store = PositionStore::new();

    h.buy(&mut store, "PEPE").await;
    assert_eq!(store.get("PEPE").unwrap().amount_acquired, dec!(1000));
    assert_eq!(h.market.native_balance_now(), dec!(0.95));

    let mut monitor = h.monitor(60);

    // 2.2x: sell half.
    h.market.set_price(dec!(0.00011));
    let report = monitor.run_cycle(&mut store, &cancel).await;
    assert_eq!(report.sells, 1);
    assert_eq!(h.market.token_balance_now(), dec!(500));

    // Same price next cycle: nothing new to sell.
    tokio::time::advance(Duration::from_secs(60)).await;
    let report = monitor.run_cycle(&mut store, &cancel).await;
    assert_eq!(report.sells, 0);

    // 3.2x: only the 3x tier fires, on the remaining balance.
    tokio::time::advance(Duration::from_secs(60)).await;
    h.market.set_price(dec!(0.00032));
    let report = monitor.run_cycle(&mut store, &cancel).await;
    match &report.actions[0].1 {
        Action::Sell { tier, record } => {
            assert_eq!(tier.multiplier, dec!(3.0));
            assert_eq!(record.amount, dec!(50));
        }
        other => panic!("expected 3x sell, got {other:?}"),
    }
    assert_eq!(h.market.token_balance_now(), dec!(450));

    // What was persisted matches memory.
    let saved = PositionStore::load(h.repo.as_ref()).unwrap();
    assert_eq!(
        saved.get("PEPE").unwrap().executed_multipliers(),
        vec![dec!(2.0), dec!(3.0)]
    );

    // Remaining tokens leave the wallet; the monitor drains and exits.
    h.market.set_token_balance(Decimal::ZERO);
    let exit = monitor.run(&mut store, &cancel).await;
    assert_eq!(exit, MonitorExit::Drained);
    assert!(PositionStore::load(h.repo.as_ref()).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_throttle_storm_leaves_position_untouched() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let mut store = PositionStore::new();
    h.buy(&mut store, "PEPE").await;
    let before = h.market.quote_requests();

    h.market.set_price(dec!(0.00011));
    h.market.throttle(5);
    let mut position = store.get("PEPE").unwrap().clone();

    let action = h.engine.evaluate(&mut position, &cancel).await;

    assert_eq!(action, Action::None);
    assert!(position.sell_history.is_empty());
    assert_eq!(h.market.quote_requests() - before, 5);
    assert_eq!(h.quotes.limiter().stats().await.consecutive_failures, 5);

    // The next cycle recovers and sells.
    tokio::time::advance(Duration::from_secs(60)).await;
    let action = h.engine.evaluate(&mut position, &cancel).await;
    assert!(matches!(action, Action::Sell { .. }));
    assert_eq!(h.quotes.limiter().stats().await.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_sell_retries_next_cycle() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let mut store = PositionStore::new();
    h.buy(&mut store, "PEPE").await;
    let mut monitor = h.monitor(60);

    h.market.set_price(dec!(0.00011));
    h.market.set_execution_error("replacement transaction underpriced");
    let report = monitor.run_cycle(&mut store, &cancel).await;
    assert_eq!(report.failed_sells, 1);
    assert!(store.get("PEPE").unwrap().sell_history.is_empty());
    assert_eq!(h.market.token_balance_now(), dec!(1000));

    tokio::time::advance(Duration::from_secs(60)).await;
    h.market.clear_execution_error();
    let report = monitor.run_cycle(&mut store, &cancel).await;
    assert_eq!(report.sells, 1);
    assert_eq!(store.get("PEPE").unwrap().executed_multipliers(), vec![dec!(2.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_restart_does_not_repeat_tiers() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let mut store = PositionStore::new();
    h.buy(&mut store, "PEPE").await;

    h.market.set_price(dec!(0.00011));
    h.monitor(60).run_cycle(&mut store, &cancel).await;
    drop(store);

    // Fresh process: reload from disk, same price, nothing sells.
    tokio::time::advance(Duration::from_secs(60)).await;
    let mut reloaded = PositionStore::load(h.repo.as_ref()).unwrap();
    let report = h.monitor(60).run_cycle(&mut reloaded, &cancel).await;
    assert_eq!(report.sells, 0);
    assert_eq!(h.market.executed().len(), 2); // buy + one sell
}

#[tokio::test(start_paused = true)]
async fn test_legacy_state_with_unknown_tier() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    h.market.set_token_balance(dec!(1000));
    h.market.set_price(dec!(0.00011));

    let legacy = format!(
        r#"{{
            "PEPE": {{
                "address": "{TOKEN}",
                "initial_balance": 1200,
                "current_balance": 1000,
                "buy_tx": "0xlegacybuy",
                "buy_time": "2024-03-01T12:00:00.123456",
                "investment_bnb": 0.05,
                "sold_history": [
                    {{"multiplier": 1.5, "amount": 200, "tx": "0xlegacysell",
                      "time": "2024-03-02T00:00:00", "bnb_value": 0.075, "profit_mult": 1.5}}
                ]
            }}
        }}"#
    );
    std::fs::write(h.repo.path(), legacy).unwrap();

    let mut store = PositionStore::load(h.repo.as_ref()).unwrap();
    let report = h.monitor(60).run_cycle(&mut store, &cancel).await;

    assert_eq!(report.sells, 1);
    let pepe = store.get("PEPE").unwrap();
    assert_eq!(pepe.executed_multipliers(), vec![dec!(1.5), dec!(2.0)]);

    // Rewritten in the current format and still loadable.
    let saved = PositionStore::load(h.repo.as_ref()).unwrap();
    assert_eq!(saved.get("PEPE").unwrap().acquisition_tx, "0xlegacybuy");
}

#[tokio::test(start_paused = true)]
async fn test_acquire_waits_for_launch() {
    let h = Harness::new();
    let mut store = PositionStore::new();
    h.market.set_no_route(true);

    let market = h.market.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(90)).await;
        market.set_no_route(false);
    });

    let request = AcquireRequest {
        symbol: "NEW".into(),
        token_address: TOKEN.into(),
        capital: dec!(0.05),
        slippage: dec!(0.15),
        wait: Some(Duration::from_secs(30)),
    };
    let position = h
        .acquirer
        .acquire(&mut store, request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(position.amount_acquired, dec!(1000));
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_rejects_overspend() {
    let h = Harness::new();
    let mut store = PositionStore::new();

    let request = AcquireRequest {
        symbol: "WHALE".into(),
        token_address: TOKEN.into(),
        capital: dec!(5),
        slippage: dec!(0.15),
        wait: None,
    };
    let err = h
        .acquirer
        .acquire(&mut store, request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<HunterError>(),
        Some(HunterError::InsufficientBalance { .. })
    ));
    assert_eq!(h.market.quote_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_persists_and_exits() {
    let h = Harness::new();
    let mut store = PositionStore::new();
    h.buy(&mut store, "PEPE").await;
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(200)).await;
        trigger.cancel();
    });

    let exit = h.monitor(60).run(&mut store, &cancel).await;
    assert_eq!(exit, MonitorExit::Cancelled);
    let saved = PositionStore::load(h.repo.as_ref()).unwrap();
    assert_eq!(saved.symbols(), vec!["PEPE"]);
}
