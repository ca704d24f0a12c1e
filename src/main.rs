//! ALPHA HUNTER: LI.FI-routed token hunter with tiered take-profit
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores positions from disk, optionally opens a new position given on
//! the command line, and then monitors every open position until they are
//! all closed or Ctrl+C is pressed.
//!
//! Usage: `alpha-hunter [token_address] [symbol]`

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use alpha_hunter::aggregator::lifi::LifiClient;
use alpha_hunter::chain::dry_run::DryRunExecutor;
use alpha_hunter::chain::rpc::RpcBalanceSource;
use alpha_hunter::chain::{BalanceSource, SwapExecutor};
use alpha_hunter::config::AppConfig;
use alpha_hunter::engine::acquire::{AcquireRequest, Acquirer};
use alpha_hunter::engine::monitor::MonitorLoop;
use alpha_hunter::engine::profit::ProfitEngine;
use alpha_hunter::quote::cache::QuoteCache;
use alpha_hunter::quote::rate_limiter::RateLimiter;
use alpha_hunter::quote::{QuoteClient, QuoteClientConfig};
use alpha_hunter::storage::{JsonFileRepository, PositionRepository, PositionStore};
use alpha_hunter::types::Asset;

const BANNER: &str = r#"
    _    _     ____  _   _    _      _   _ _   _ _   _ _____ _____ ____
   / \  | |   |  _ \| | | |  / \    | | | | | | | \ | |_   _| ____|  _ \
  / _ \ | |   | |_) | |_| | / _ \   | |_| | | | |  \| | | | |  _| | |_) |
 / ___ \| |___|  __/|  _  |/ ___ \  |  _  | |_| | |\  | | | | |___|  _ <
/_/   \_\_____|_|   |_| |_/_/   \_\ |_| |_|\___/|_| \_| |_| |_____|_| \_\

  LI.FI-routed acquisition with tiered take-profit
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        chain_id = cfg.chain.chain_id,
        check_interval_secs = cfg.agent.check_interval_secs,
        dry_run = cfg.agent.dry_run,
        "ALPHA HUNTER starting up"
    );

    let wallet = AppConfig::resolve_env(&cfg.chain.wallet_address_env)?;
    let native = Asset::native(cfg.chain.native_decimals);
    let ladder = cfg.ladder()?;

    // -- Quote pipeline ---------------------------------------------------

    let limiter = Arc::new(RateLimiter::new(cfg.rate_limit.limiter_config())?);
    let cache = cfg
        .cache
        .enabled
        .then(|| Arc::new(QuoteCache::new(Duration::from_secs(cfg.cache.ttl_secs))));

    let lifi = LifiClient::new(
        cfg.aggregator.base_url.clone(),
        cfg.aggregator_api_key(),
        cfg.aggregator.timeout_secs,
    )?;
    if !lifi.has_api_key() {
        warn!("No LI.FI API key configured, anonymous rate limits apply");
    }

    let quotes = Arc::new(
        QuoteClient::new(
            Arc::new(lifi),
            limiter,
            cache,
            QuoteClientConfig {
                chain_id: cfg.chain.chain_id,
                from_address: wallet.clone(),
                max_retries: cfg.aggregator.max_retries,
                retry_cap: Duration::from_secs(cfg.rate_limit.backoff_cap_secs),
                key_precision: cfg.cache.key_precision(),
            },
        )
        .with_span(info_span!("quote")),
    );

    // -- Chain collaborators ----------------------------------------------

    let rpc = RpcBalanceSource::new(&cfg.chain.rpc_url, &wallet, cfg.chain.native_decimals)?;
    match rpc.block_number().await {
        Ok(block) => info!(block, rpc = %cfg.chain.rpc_url, "RPC connected"),
        Err(e) => warn!(error = %e, rpc = %cfg.chain.rpc_url, "RPC probe failed, balances may be unavailable"),
    }
    match rpc.native_balance().await {
        Ok(balance) => info!(wallet = %rpc.wallet(), %balance, "Wallet balance"),
        Err(e) => warn!(error = %e, "Could not read wallet balance"),
    }
    let balances: Arc<dyn BalanceSource> = Arc::new(rpc);

    if !cfg.agent.dry_run {
        bail!("Live execution needs a signing executor; set agent.dry_run = true");
    }
    let executor: Arc<dyn SwapExecutor> = Arc::new(DryRunExecutor::new());

    // -- Restore positions ------------------------------------------------

    let repo = Arc::new(JsonFileRepository::new(&cfg.agent.state_file));
    let mut store = PositionStore::load(repo.as_ref())?;
    for position in store.iter() {
        info!(position = %position, "Resumed position");
    }

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received.");
            signal.cancel();
        }
    });

    // -- Optional acquisition ---------------------------------------------

    let mut args = std::env::args().skip(1);
    if let Some(token_address) = args.next() {
        let symbol = args.next().unwrap_or_else(|| token_address.clone());
        let acquirer = Acquirer::new(
            Arc::clone(&quotes),
            Arc::clone(&balances),
            Arc::clone(&executor),
            native.clone(),
            cfg.strategy.max_positions,
        )
        .with_span(info_span!("acquire", symbol = %symbol));

        let request = AcquireRequest {
            symbol,
            token_address,
            capital: cfg.strategy.initial_investment,
            slippage: cfg.strategy.slippage,
            wait: cfg
                .strategy
                .wait_for_liquidity
                .then(|| Duration::from_secs(cfg.strategy.liquidity_retry_secs)),
        };

        match acquirer.acquire(&mut store, request, &cancel).await {
            Ok(position) => {
                info!(position = %position, "Acquisition complete");
                if let Err(e) = store.save(repo.as_ref()) {
                    error!(error = %e, "Failed to save positions");
                }
            }
            Err(e) => error!(error = %e, "Acquisition failed"),
        }
    }

    // -- Monitor ----------------------------------------------------------

    let engine = Arc::new(
        ProfitEngine::new(quotes, balances, executor, ladder, cfg.strategy.slippage, native)
            .with_span(info_span!("profit")),
    );
    let tiers: Vec<String> = engine.ladder().tiers().iter().map(ToString::to_string).collect();
    info!(tiers = %tiers.join(", "), "Take-profit ladder");

    let repo: Arc<dyn PositionRepository> = repo;
    let mut monitor = MonitorLoop::new(engine, Arc::clone(&repo), cfg.check_interval())
        .with_span(info_span!("monitor"));

    info!(
        interval_secs = cfg.agent.check_interval_secs,
        positions = store.len(),
        "Entering monitor loop. Press Ctrl+C to stop."
    );
    let exit = monitor.run(&mut store, &cancel).await;

    store.save(repo.as_ref())?;
    info!(
        exit = ?exit,
        cycles = monitor.cycles(),
        open_positions = store.len(),
        "ALPHA HUNTER shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("alpha_hunter=info"));

    let json_logging = std::env::var("ALPHA_HUNTER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
